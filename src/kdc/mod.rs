//! The request processing pipeline from "authenticator received" to
//! "sealed reply emitted". Every stage either completes or raises exactly
//! one typed error; the caller always receives a sealed reply or a
//! KRB-ERROR, never a raw failure.

pub(crate) mod policy;
pub mod replay;
pub(crate) mod time;

use self::policy::IssuePlan;
use self::replay::{ReplayCache, ReplayResult};
use self::time::{TicketGrantTimeBound, TicketRenewTimeBound};
use crate::config::KdcPolicy;
use crate::error::KrbError;
use crate::proto::{
    DerivedKey, EncryptionType, HostAddress, KerberosReply, Name, TicketFlags, TicketGrantReplyBuilder,
    TicketGrantRequest, TicketGrantRequestUnverified, TicketRenewReplyBuilder,
};
use crate::store::PrincipalStore;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, instrument, trace};

/// First mutual encryption type, honouring server preference order.
fn negotiate_etype(
    offered: &[i32],
    configured: &[EncryptionType],
) -> Result<EncryptionType, KrbError> {
    configured
        .iter()
        .find(|etype| offered.contains(&(**etype as i32)))
        .copied()
        .ok_or(KrbError::NoMatchingEncryptionType)
}

/// The ticket granting service. One of these exists per process; the
/// replay cache it shares with any other consumers is handed in at
/// construction rather than reached for as a global.
pub struct TicketGrantService<S: PrincipalStore> {
    policy: KdcPolicy,
    store: S,
    replay_cache: Arc<ReplayCache>,
    tgs_name: Name,
}

impl<S: PrincipalStore> TicketGrantService<S> {
    pub fn new(policy: KdcPolicy, store: S, replay_cache: Arc<ReplayCache>) -> Self {
        let tgs_name = Name::service_krbtgt(&policy.realm);
        TicketGrantService {
            policy,
            store,
            replay_cache,
            tgs_name,
        }
    }

    pub fn policy(&self) -> &KdcPolicy {
        &self.policy
    }

    /// Process one TGS-REQ to completion. On success the sealed reply; on
    /// any stage failure a KRB-ERROR reply naming this KDC, built from
    /// the stage's typed error. There is no retry path - a failed request
    /// is terminal and the client must resubmit.
    #[instrument(level = "info", skip_all)]
    pub fn process_ticket_grant(
        &self,
        tgs_req: &TicketGrantRequestUnverified,
        stime: SystemTime,
    ) -> Result<KerberosReply, KerberosReply> {
        self.issue(tgs_req, stime).map_err(|err| {
            error!(?err, "ticket grant refused");
            KerberosReply::error_reply(err, self.tgs_name.clone(), stime)
        })
    }

    fn issue(
        &self,
        tgs_req: &TicketGrantRequestUnverified,
        now: SystemTime,
    ) -> Result<KerberosReply, KrbError> {
        // Which encryption type will the new ticket's session key use.
        let etype = negotiate_etype(&tgs_req.req_body.etypes, &self.policy.etypes)?;

        let Some(ap_req) = &tgs_req.preauth.tgs_req else {
            return Err(KrbError::TgsMissingPaApReq);
        };

        // A ticket for a foreign realm belongs to a foreign KDC, before
        // we even look at our own store.
        if ap_req.ticket.service().realm() != self.policy.realm {
            return Err(KrbError::TgsNotForRealm);
        }

        // Resolve the long term key of the principal the presented ticket
        // names as its server - krbtgt for a TGT, the service itself when
        // a ticket renews or validates itself.
        let presented_service = ap_req.ticket.service().clone().service_hst_normalise();
        let presented_record = self.store.lookup(&presented_service).ok_or_else(|| {
            error!(%presented_service, "no key material for the ticket's server principal");
            KrbError::TgsServiceNoKey
        })?;

        let presented_etype = EncryptionType::try_from(ap_req.ticket.enc_part().etype())
            .map_err(|_| KrbError::UnsupportedEncryption)?;
        let ticket_service_key = presented_record
            .key_for_etype(presented_etype)
            .ok_or(KrbError::TgsServiceNoKey)?;

        // Structural and cryptographic verification of the credentials.
        let tgs_req_valid = tgs_req.validate(ticket_service_key, &self.policy.realm)?;

        trace!(service = %tgs_req_valid.service_name(), "tgs-req validated");

        // The authenticator must be fresh, and must never have been seen
        // before. The insert stands even if a later stage fails - the
        // ticket was never issued, and RFC4120 demands a new
        // authenticator per request anyway.
        tgs_req_valid.verify_client_time(now, self.policy.maximum_clock_skew)?;

        let client_name = tgs_req_valid.ticket_granting_ticket().client_name().clone();
        if self.replay_cache.check_and_insert(
            &client_name,
            &presented_service,
            tgs_req_valid.client_time(),
            now,
        ) == ReplayResult::Replay
        {
            return Err(KrbError::TgsAuthenticatorReplay);
        }

        tgs_req_valid.verify_ticket_window(now, self.policy.maximum_clock_skew)?;

        // In-flight tampering of the request body. Mandatory when the
        // policy has it enabled.
        if self.policy.verify_body_checksum {
            tgs_req_valid.verify_body_checksum()?;
        }

        match policy::evaluate(&tgs_req_valid, &self.policy, now)? {
            IssuePlan::Grant {
                flags,
                client_addresses,
            } => self.issue_grant(tgs_req_valid, etype, flags, client_addresses, now),
            IssuePlan::Renew => self.issue_renewal(tgs_req_valid, etype, now),
            IssuePlan::Validate { flags } => self.issue_validation(tgs_req_valid, etype, flags),
        }
    }

    fn service_key_for(
        &self,
        service_name: &Name,
        etype: EncryptionType,
    ) -> Result<DerivedKey, KrbError> {
        let record = self.store.lookup(service_name).ok_or_else(|| {
            error!(%service_name, "service principal unknown");
            KrbError::ServicePrincipalNotFound
        })?;

        record
            .key_for_etype(etype)
            .or_else(|| record.preferred_key())
            .cloned()
            .ok_or(KrbError::TgsServiceNoKey)
    }

    fn issue_grant(
        &self,
        request: TicketGrantRequest,
        etype: EncryptionType,
        flags: TicketFlags,
        client_addresses: Option<Vec<HostAddress>>,
        now: SystemTime,
    ) -> Result<KerberosReply, KrbError> {
        let service_name = request.service_name().clone().service_hst_normalise();
        let service_key = self.service_key_for(&service_name, etype)?;

        let renewable_requested = flags.contains(TicketFlags::Renewable);

        let time_bounds = TicketGrantTimeBound::evaluate(
            now,
            self.policy.maximum_clock_skew,
            self.policy.maximum_ticket_lifetime,
            self.policy.maximum_renewable_lifetime,
            self.policy.allow_renewable,
            renewable_requested,
            &request,
        )?;

        TicketGrantReplyBuilder::new(request, etype, flags, time_bounds)
            .client_addresses(client_addresses)
            .build(&service_key)
    }

    fn issue_renewal(
        &self,
        request: TicketGrantRequest,
        etype: EncryptionType,
        now: SystemTime,
    ) -> Result<KerberosReply, KrbError> {
        let service_name = request.service_name().clone().service_hst_normalise();
        let service_key = self.service_key_for(&service_name, etype)?;

        let time_bounds =
            TicketRenewTimeBound::evaluate(now, self.policy.maximum_clock_skew, &request)?;

        let flags = *request.ticket_flags();

        TicketRenewReplyBuilder::new(
            request,
            etype,
            flags,
            time_bounds.start_time(),
            time_bounds.end_time(),
            Some(time_bounds.renew_until()),
        )
        .build(&service_key)
    }

    fn issue_validation(
        &self,
        request: TicketGrantRequest,
        etype: EncryptionType,
        flags: TicketFlags,
    ) -> Result<KerberosReply, KrbError> {
        let service_name = request.service_name().clone().service_hst_normalise();
        let service_key = self.service_key_for(&service_name, etype)?;

        let tgt = request.ticket_granting_ticket();
        let start_time = tgt.start_time();
        let end_time = tgt.end_time();
        let renew_until = tgt.renew_until();

        TicketRenewReplyBuilder::new(request, etype, flags, start_time, end_time, renew_until)
            .build(&service_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{
        AuthorizationDataEntry, EncTicket, KrbErrorCode, SessionKey, TicketGrantReply,
        TicketGrantRequestBuilder, TicketIssueBuilder,
    };
    use crate::proto::KdcOptions;
    use crate::store::{MemoryPrincipalStore, PrincipalRecord};
    use std::time::{Duration, UNIX_EPOCH};

    const REALM: &str = "EXAMPLE.COM";
    const SKEW: Duration = Duration::from_secs(300);
    const MAX_LIFE: Duration = Duration::from_secs(3600 * 8);

    // A fixed whole-second clock keeps KerberosTime truncation exact.
    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_755_000_000 + secs)
    }

    struct TestKdc {
        service: TicketGrantService<MemoryPrincipalStore>,
        krbtgt_key: DerivedKey,
        host_key: DerivedKey,
        client: Name,
        host_service: Name,
    }

    fn test_kdc_with<F>(tune: F) -> TestKdc
    where
        F: FnOnce(&mut KdcPolicy),
    {
        let mut policy = KdcPolicy {
            realm: REALM.to_string(),
            maximum_clock_skew: SKEW,
            maximum_ticket_lifetime: MAX_LIFE,
            maximum_renewable_lifetime: Duration::from_secs(86400 * 7),
            etypes: vec![EncryptionType::AES256_CTS_HMAC_SHA1_96],
            allow_forwardable: true,
            allow_proxiable: true,
            allow_postdate: true,
            allow_renewable: true,
            allow_empty_addresses: false,
            verify_body_checksum: true,
        };
        tune(&mut policy);

        let krbtgt_key = DerivedKey::from_raw_aes256(&[0x17; 32], 1).unwrap();
        let host_key = DerivedKey::new_aes256_cts_hmac_sha1_96(
            "a host service secret",
            "EXAMPLE.COMhost/files.example.com",
            4096,
            2,
        )
        .unwrap();

        let client = Name::principal("alice", REALM);
        let host_service = Name::service("host", "files.example.com", REALM);

        let mut store = MemoryPrincipalStore::new();
        store.insert(
            Name::service_krbtgt(REALM),
            PrincipalRecord::new_service(krbtgt_key.clone()),
        );
        store.insert(
            host_service.clone(),
            PrincipalRecord::new_service(host_key.clone()),
        );

        let replay_cache = Arc::new(ReplayCache::new(SKEW));
        let service = TicketGrantService::new(policy, store, replay_cache);

        TestKdc {
            service,
            krbtgt_key,
            host_key,
            client,
            host_service,
        }
    }

    fn test_kdc() -> TestKdc {
        test_kdc_with(|_| {})
    }

    /// TGT authenticated a minute ago, valid for an hour from `now`.
    fn mint_tgt(
        kdc: &TestKdc,
        now: SystemTime,
        flags: TicketFlags,
        renew_until: Option<SystemTime>,
    ) -> (EncTicket, SessionKey) {
        TicketIssueBuilder::new(
            Name::service_krbtgt(REALM),
            kdc.client.clone(),
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
        )
        .flags(flags)
        .renew_until(renew_until)
        .build(&kdc.krbtgt_key)
        .unwrap()
    }

    fn expect_grant(result: Result<KerberosReply, KerberosReply>) -> TicketGrantReply {
        match result {
            Ok(KerberosReply::TGS(reply)) => reply,
            other => panic!("expected a sealed reply, got {other:?}"),
        }
    }

    fn expect_error(result: Result<KerberosReply, KerberosReply>) -> KrbErrorCode {
        match result {
            Err(KerberosReply::ERR(err)) => err.code(),
            other => panic!("expected a krb-error reply, got {other:?}"),
        }
    }

    #[test]
    fn scenario_a_forwardable_grant() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(
            &kdc,
            now,
            TicketFlags::Renewable | TicketFlags::Forwardable,
            Some(now + Duration::from_secs(86400)),
        );

        let until = now + Duration::from_secs(1800);
        let req = TicketGrantRequestBuilder::new(kdc.host_service.clone(), now, until)
            .kdc_options(KdcOptions::Forwardable)
            .preauth_ap_req(&kdc.client, &tgt, &session_key)
            .unwrap()
            .build()
            .unwrap();
        let nonce = req.req_body.nonce;

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));

        let part = reply.decrypt_reply_part(&session_key, false).unwrap();
        assert!(part.flags.contains(TicketFlags::Forwardable));
        assert!(!part.flags.contains(TicketFlags::Renewable));
        assert_eq!(part.nonce, nonce);
        assert_eq!(part.start_time, Some(now));
        // end = min(requested till, now + max lifetime, tgt end)
        assert_eq!(part.end_time, until);
        assert_eq!(part.renew_until, None);
        assert_eq!(part.server, kdc.host_service);

        // The issued ticket opens under the service's long term key and
        // agrees with the reply on every field.
        let ticket_part = kdc
            .host_key
            .decrypt_ticket_part(reply.ticket.enc_part())
            .unwrap();
        assert_eq!(ticket_part.flags, part.flags);
        assert_eq!(ticket_part.end_time.to_system_time(), until);
        assert_eq!(SessionKey::try_from(ticket_part.key).unwrap(), part.key);
        assert_eq!(
            Name::try_from((&ticket_part.cname, &ticket_part.crealm)).unwrap(),
            kdc.client
        );
    }

    #[test]
    fn scenario_b_postdated_without_may_postdate() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::Renewable, None);

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .kdc_options(KdcOptions::Postdated)
        .from(Some(now + Duration::from_secs(7200)))
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KdcErrBadoption
        );
    }

    #[test]
    fn scenario_c_validate_without_invalid() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::Renewable, None);

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .kdc_options(KdcOptions::Validate)
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KdcErrPolicy
        );
    }

    #[test]
    fn scenario_d_till_shorter_than_skew() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KdcErrNeverValid
        );
    }

    #[test]
    fn replay_second_submission_rejected() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        expect_grant(kdc.service.process_ticket_grant(&req, now));

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KrbApErrRepeat
        );
    }

    #[test]
    fn tampered_body_detected() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let mut req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        // Any single bit flip after the client signed the body.
        req.req_body_bytes[10] ^= 0x01;

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KrbApErrModified
        );
    }

    #[test]
    fn checksum_gate_can_be_disabled() {
        let kdc = test_kdc_with(|policy| policy.verify_body_checksum = false);
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let mut req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        req.req_body_bytes[10] ^= 0x01;

        // With verification off the tamper goes unnoticed - which is why
        // the gate defaults to on.
        expect_grant(kdc.service.process_ticket_grant(&req, now));
    }

    #[test]
    fn sub_session_key_seal_usage_separation() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let sub_key = SessionKey::generate(EncryptionType::AES256_CTS_HMAC_SHA1_96).unwrap();

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .sub_session_key(sub_key.clone())
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));

        // Sealed under the sub-session key with the subkey usage number.
        assert!(reply.decrypt_reply_part(&sub_key, true).is_ok());
        // The same key with the session usage number must not open it,
        // nor may the ticket session key.
        assert!(reply.decrypt_reply_part(&sub_key, false).is_err());
        assert!(reply.decrypt_reply_part(&session_key, false).is_err());
    }

    #[test]
    fn renewal_preserves_lifespan() {
        let kdc = test_kdc();
        let now = t(0);
        let renew_until = now + Duration::from_secs(86400);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::Renewable, Some(renew_until));

        // Renewing the TGT: the requested service is the TGS itself.
        let req = TicketGrantRequestBuilder::new(
            Name::service_krbtgt(REALM),
            now,
            now + Duration::from_secs(3600),
        )
        .kdc_options(KdcOptions::Renew)
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));
        let part = reply.decrypt_reply_part(&session_key, false).unwrap();

        // Original lifespan was 3660s (start one minute before now); the
        // renewed window keeps it, anchored at now.
        assert_eq!(part.start_time, Some(now));
        assert_eq!(part.end_time, now + Duration::from_secs(3660));
        assert_eq!(part.renew_until, Some(renew_until));
        assert!(part.flags.contains(TicketFlags::Renewable));

        // Renewed TGT is sealed under the krbtgt key.
        let ticket_part = kdc
            .krbtgt_key
            .decrypt_ticket_part(reply.ticket.enc_part())
            .unwrap();
        assert_eq!(ticket_part.end_time.to_system_time(), now + Duration::from_secs(3660));
    }

    #[test]
    fn renewable_ok_upgrade_is_visible() {
        let kdc = test_kdc();
        let now = t(0);
        let renew_until = now + Duration::from_secs(86400);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::Renewable, Some(renew_until));

        // Ask far beyond what the TGT end can honour, with RENEWABLE-OK.
        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(86400 * 3),
        )
        .kdc_options(KdcOptions::RenewableOk)
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));
        let part = reply.decrypt_reply_part(&session_key, false).unwrap();

        // The upgrade is reflected in the visible flags and the ticket.
        assert!(part.flags.contains(TicketFlags::Renewable));
        assert_eq!(part.end_time, now + Duration::from_secs(3600));
        assert_eq!(part.renew_until, Some(renew_until));

        let ticket_part = kdc
            .host_key
            .decrypt_ticket_part(reply.ticket.enc_part())
            .unwrap();
        assert!(ticket_part.flags.contains(TicketFlags::Renewable));
    }

    #[test]
    fn forwarded_copies_requested_addresses() {
        let kdc = test_kdc();
        let now = t(0);

        let tgt_addr = HostAddress {
            addr_type: 2,
            address: vec![10, 0, 0, 5],
        };
        let (tgt, session_key) = TicketIssueBuilder::new(
            Name::service_krbtgt(REALM),
            kdc.client.clone(),
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
        )
        .flags(TicketFlags::Forwardable)
        .client_addresses(vec![tgt_addr])
        .build(&kdc.krbtgt_key)
        .unwrap();

        let fwd_addr = HostAddress {
            addr_type: 2,
            address: vec![10, 0, 0, 9],
        };
        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .kdc_options(KdcOptions::Forwardable | KdcOptions::Forwarded)
        .addresses(vec![fwd_addr.clone()])
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));
        let ticket_part = kdc
            .host_key
            .decrypt_ticket_part(reply.ticket.enc_part())
            .unwrap();

        assert!(ticket_part.flags.contains(TicketFlags::Forwarded));
        let addrs: Vec<HostAddress> = ticket_part
            .client_addresses
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(HostAddress::from)
            .collect();
        assert_eq!(addrs, vec![fwd_addr]);
    }

    #[test]
    fn postdate_then_validate() {
        let kdc = test_kdc();
        let now = t(0);

        // A TGT that outlives the postdated window.
        let (tgt, session_key) = TicketIssueBuilder::new(
            Name::service_krbtgt(REALM),
            kdc.client.clone(),
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600 * 10),
        )
        .flags(TicketFlags::MayPostdate)
        .build(&kdc.krbtgt_key)
        .unwrap();

        let start = now + Duration::from_secs(3600);
        let until = now + Duration::from_secs(7200);
        let req = TicketGrantRequestBuilder::new(kdc.host_service.clone(), now, until)
            .kdc_options(KdcOptions::Postdated)
            .from(Some(start))
            .preauth_ap_req(&kdc.client, &tgt, &session_key)
            .unwrap()
            .build()
            .unwrap();

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));
        let part = reply.decrypt_reply_part(&session_key, false).unwrap();
        assert!(part.flags.contains(TicketFlags::Postdated));
        assert!(part.flags.contains(TicketFlags::Invalid));
        assert_eq!(part.start_time, Some(start));
        assert_eq!(part.end_time, until);

        // Once the start time arrives, the ticket validates itself.
        let later = start + Duration::from_secs(10);
        let validate_req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            later,
            until,
        )
        .kdc_options(KdcOptions::Validate)
        .preauth_ap_req(&kdc.client, &reply.ticket, &part.key)
        .unwrap()
        .build()
        .unwrap();

        let validated = expect_grant(kdc.service.process_ticket_grant(&validate_req, later));
        let validated_part = kdc
            .host_key
            .decrypt_ticket_part(validated.ticket.enc_part())
            .unwrap();

        assert!(!validated_part.flags.contains(TicketFlags::Invalid));
        assert!(validated_part.flags.contains(TicketFlags::Postdated));
        // The window is echoed, not recomputed.
        assert_eq!(
            validated_part.start_time.map(|ts| ts.to_system_time()),
            Some(start)
        );
        assert_eq!(validated_part.end_time.to_system_time(), until);
    }

    #[test]
    fn no_mutual_encryption_type() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .etypes(vec![EncryptionType::RC4_HMAC])
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KdcErrEtypeNosupp
        );
    }

    #[test]
    fn unknown_service_principal() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let req = TicketGrantRequestBuilder::new(
            Name::service("imap", "mail.example.com", REALM),
            now,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KdcErrSPrincipalUnknown
        );
    }

    #[test]
    fn foreign_realm_ticket_not_us() {
        let kdc = test_kdc();
        let now = t(0);

        // A "TGT" from some other realm's KDC. The key does not matter,
        // the realm check fires before any unsealing.
        let foreign_key = DerivedKey::from_raw_aes256(&[0x42; 32], 1).unwrap();
        let (tgt, session_key) = TicketIssueBuilder::new(
            Name::service_krbtgt("OTHER.NET"),
            Name::principal("alice", "OTHER.NET"),
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
        )
        .build(&foreign_key)
        .unwrap();

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&Name::principal("alice", "OTHER.NET"), &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KrbApErrNotUs
        );
    }

    #[test]
    fn user_to_user_fails_closed() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .kdc_options(KdcOptions::EncTktInSkey)
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KdcErrBadoption
        );
    }

    #[test]
    fn expired_tgt_rejected() {
        let kdc = test_kdc();
        let now = t(100_000);

        let (tgt, session_key) = TicketIssueBuilder::new(
            Name::service_krbtgt(REALM),
            kdc.client.clone(),
            now - Duration::from_secs(7200),
            now - Duration::from_secs(3600),
        )
        .build(&kdc.krbtgt_key)
        .unwrap();

        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KrbApErrTktExpired
        );
    }

    #[test]
    fn stale_authenticator_rejected() {
        let kdc = test_kdc();
        let now = t(0);
        let (tgt, session_key) = mint_tgt(&kdc, now, TicketFlags::none(), None);

        // Authenticator stamped well outside the skew window.
        let stale = now - SKEW - Duration::from_secs(60);
        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            stale,
            now + Duration::from_secs(1800),
        )
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(
            expect_error(kdc.service.process_ticket_grant(&req, now)),
            KrbErrorCode::KrbApErrSkew
        );
    }

    #[test]
    fn authorization_data_merges_request_and_ticket() {
        let kdc = test_kdc();
        let now = t(0);

        let tgt_entry = AuthorizationDataEntry {
            ad_type: 1,
            ad_data: b"from-the-tgt".to_vec(),
        };
        let (tgt, session_key) = TicketIssueBuilder::new(
            Name::service_krbtgt(REALM),
            kdc.client.clone(),
            now - Duration::from_secs(60),
            now + Duration::from_secs(3600),
        )
        .authorization_data(vec![tgt_entry.clone()])
        .build(&kdc.krbtgt_key)
        .unwrap();

        let req_entry = AuthorizationDataEntry {
            ad_type: 1,
            ad_data: b"from-the-request".to_vec(),
        };
        let sub_key = SessionKey::generate(EncryptionType::AES256_CTS_HMAC_SHA1_96).unwrap();
        let req = TicketGrantRequestBuilder::new(
            kdc.host_service.clone(),
            now,
            now + Duration::from_secs(1800),
        )
        .sub_session_key(sub_key.clone())
        .authorization_data(vec![req_entry.clone()])
        .preauth_ap_req(&kdc.client, &tgt, &session_key)
        .unwrap()
        .build()
        .unwrap();

        let reply = expect_grant(kdc.service.process_ticket_grant(&req, now));
        let ticket_part = kdc
            .host_key
            .decrypt_ticket_part(reply.ticket.enc_part())
            .unwrap();

        let entries: Vec<AuthorizationDataEntry> = ticket_part
            .authorization_data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(AuthorizationDataEntry::from)
            .collect();

        // Request data first, then the presented ticket's restrictions.
        assert_eq!(entries, vec![req_entry, tgt_entry]);
    }
}
