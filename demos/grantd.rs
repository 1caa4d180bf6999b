//! Stand up an in-process ticket granting service from a TOML config,
//! mint a TGT against the configured primary key, then drive a grant and
//! a renewal through the full pipeline.
//!
//!     cargo run --example grantd -- demos/grantd.toml

use clap::Parser;
use libgrant::config::{Config, ServerState};
use libgrant::kdc::replay::ReplayCache;
use libgrant::kdc::TicketGrantService;
use libgrant::proto::{
    DerivedKey, KdcOptions, KerberosReply, Name, TicketFlags, TicketGrantRequestBuilder,
    TicketIssueBuilder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(about = "Issue a service ticket against an in-process TGS")]
struct Opt {
    config: PathBuf,
    /// Client principal to issue for.
    #[clap(long, default_value = "alice")]
    client: String,
    /// Service principal, as srvname/hostname.
    #[clap(long, default_value = "host/files.example.com")]
    service: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let opt = Opt::parse();

    let config = Config::parse(&opt.config)?;
    let state = ServerState::try_from(&config).map_err(|err| format!("{err:?}"))?;
    let realm = state.policy.realm.clone();
    let skew = state.policy.maximum_clock_skew;

    let krbtgt_key = DerivedKey::from_raw_aes256(&config.primary_key, 1)
        .map_err(|err| format!("{err:?}"))?;

    let client = Name::principal(&opt.client, &realm);
    let (srvname, hostname) = opt
        .service
        .split_once('/')
        .ok_or("service must be given as srvname/hostname")?;
    let service = Name::service(srvname, hostname, &realm);

    let tgs = TicketGrantService::new(state.policy, state.store, Arc::new(ReplayCache::new(skew)));

    // A TGT as the AS exchange would have issued it.
    let now = SystemTime::now();
    let (tgt, session_key) = TicketIssueBuilder::new(
        Name::service_krbtgt(&realm),
        client.clone(),
        now,
        now + Duration::from_secs(900),
    )
    .flags(TicketFlags::Renewable | TicketFlags::Forwardable)
    .renew_until(Some(now + Duration::from_secs(86400)))
    .build(&krbtgt_key)
    .map_err(|err| format!("{err:?}"))?;

    info!(%client, "minted ticket granting ticket");

    // Ask for a service ticket.
    let req = TicketGrantRequestBuilder::new(service.clone(), now, now + Duration::from_secs(3600))
        .preauth_ap_req(&client, &tgt, &session_key)
        .map_err(|err| format!("{err:?}"))?
        .build()
        .map_err(|err| format!("{err:?}"))?;

    match tgs.process_ticket_grant(&req, SystemTime::now()) {
        Ok(KerberosReply::TGS(reply)) => {
            let part = reply
                .decrypt_reply_part(&session_key, false)
                .map_err(|err| format!("{err:?}"))?;
            info!(server = %part.server, flags = ?part.flags, "service ticket issued");
            info!(?part.end_time, "valid until");
        }
        Ok(other) => info!(?other, "unexpected reply"),
        Err(KerberosReply::ERR(err)) => {
            info!(code = ?err.code(), text = ?err.text(), "ticket grant refused");
        }
        Err(other) => info!(?other, "unexpected error reply"),
    }

    // Renew the TGT itself.
    let renew_req = TicketGrantRequestBuilder::new(
        Name::service_krbtgt(&realm),
        now + Duration::from_secs(1),
        now + Duration::from_secs(3600),
    )
    .kdc_options(KdcOptions::Renew)
    .preauth_ap_req(&client, &tgt, &session_key)
    .map_err(|err| format!("{err:?}"))?
    .build()
    .map_err(|err| format!("{err:?}"))?;

    match tgs.process_ticket_grant(&renew_req, SystemTime::now()) {
        Ok(KerberosReply::TGS(reply)) => {
            let part = reply
                .decrypt_reply_part(&session_key, false)
                .map_err(|err| format!("{err:?}"))?;
            info!(?part.end_time, ?part.renew_until, "ticket granting ticket renewed");
        }
        Ok(other) => info!(?other, "unexpected reply"),
        Err(KerberosReply::ERR(err)) => {
            info!(code = ?err.code(), text = ?err.text(), "renewal refused");
        }
        Err(other) => info!(?other, "unexpected error reply"),
    }

    Ok(())
}
