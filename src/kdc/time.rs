//! Validity window arithmetic for issued tickets. All comparisons are on
//! absolute timestamps at second granularity; "within clock skew" means
//! the two timestamps differ by no more than the configured tolerance.

use crate::error::KrbError;
use crate::proto::{KdcOptions, TicketFlags, TicketGrantRequest};
use std::cmp;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

pub(crate) fn is_within_allowed_skew(
    reference_time: SystemTime,
    requested_time: SystemTime,
    maximum_clock_skew: Duration,
) -> bool {
    match reference_time.duration_since(requested_time) {
        // The requested time is equal to or earlier than reference_time
        Ok(diff) => diff <= maximum_clock_skew,
        // The requested time is greater than the reference time
        Err(diff) => diff.duration() <= maximum_clock_skew,
    }
}

/// The window of a freshly granted service ticket.
pub struct TicketGrantTimeBound {
    start_time: SystemTime,
    end_time: SystemTime,
    renew_until: Option<SystemTime>,
}

impl TicketGrantTimeBound {
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn renew_until(&self) -> Option<SystemTime> {
        self.renew_until
    }

    /// Derive (start, end, renew-till) for a new service ticket.
    ///
    /// * start is now, unless POSTDATED pinned it to the requested from
    ///   time. A future from time without POSTDATED is refused.
    /// * end is the earliest of the requested till, start plus the
    ///   configured ceiling, and the presented ticket's own end.
    /// * If RENEWABLE-OK was requested and the clamped end falls short of
    ///   what was asked, renewal is upgraded silently - provided the
    ///   presented ticket is renewable and policy allows renewal at all.
    /// * renew-till exists only when the final flags will carry
    ///   RENEWABLE: the earliest of the requested rtime, start plus the
    ///   renewable ceiling, and the presented ticket's renew-till.
    pub(crate) fn evaluate(
        now: SystemTime,
        maximum_clock_skew: Duration,
        maximum_ticket_lifetime: Duration,
        maximum_renewable_lifetime: Duration,
        renewal_allowed_by_policy: bool,
        renewable_requested: bool,
        request: &TicketGrantRequest,
    ) -> Result<TicketGrantTimeBound, KrbError> {
        let tgt = request.ticket_granting_ticket();

        let postdated = request
            .kdc_options()
            .contains(KdcOptions::Postdated);

        let start_time = grant_start_time(
            now,
            request.requested_start_time(),
            postdated,
            maximum_clock_skew,
        )?;

        // An epoch till means "as long as policy permits".
        let requested_till = if request.requested_end_time() == UNIX_EPOCH {
            None
        } else {
            Some(request.requested_end_time())
        };

        let mut end_time = cmp::min(start_time + maximum_ticket_lifetime, tgt.end_time());
        if let Some(till) = requested_till {
            end_time = cmp::min(end_time, till);
        }

        let upgraded_to_renewable = !renewable_requested
            && request.kdc_options().contains(KdcOptions::RenewableOk)
            && requested_till.map(|till| till > end_time).unwrap_or(false)
            && tgt.flags().contains(TicketFlags::Renewable)
            && renewal_allowed_by_policy;

        let renewable = renewable_requested || upgraded_to_renewable;

        let renew_until = if renewable {
            let presented_bound = tgt.renew_until().unwrap_or_else(|| tgt.end_time());
            let mut renew_until =
                cmp::min(start_time + maximum_renewable_lifetime, presented_bound);
            if let Some(rtime) = request.requested_renew_until() {
                renew_until = cmp::min(renew_until, rtime);
            }
            // end <= renew-till must hold whenever RENEWABLE is set.
            Some(cmp::max(renew_until, end_time))
        } else {
            None
        };

        check_minimum_lifetime(start_time, end_time, maximum_clock_skew)?;

        Ok(TicketGrantTimeBound {
            start_time,
            end_time,
            renew_until,
        })
    }
}

/*
 * start_time
 *
 * If the requested from is absent, indicates a time in the past, or sits
 * within the window of acceptable clock skew, and the POSTDATED option
 * has not been specified, the ticket starts now. A from time genuinely in
 * the future is only honoured when POSTDATED was requested - the policy
 * engine has already confirmed the presented ticket permits postdating by
 * the time this runs.
 */
fn grant_start_time(
    now: SystemTime,
    requested_start_time: Option<SystemTime>,
    postdated: bool,
    maximum_clock_skew: Duration,
) -> Result<SystemTime, KrbError> {
    let Some(requested) = requested_start_time else {
        return Ok(now);
    };

    if requested == UNIX_EPOCH {
        return Ok(now);
    }

    if postdated {
        return Ok(requested);
    }

    if requested <= now || is_within_allowed_skew(now, requested, maximum_clock_skew) {
        Ok(now)
    } else {
        Err(KrbError::TgsCannotPostdate)
    }
}

/// A degenerate window is refused outright: end must not precede start,
/// and the lifetime must be at least one clock skew unit, else the ticket
/// could expire before the client's clock agrees it ever started.
fn check_minimum_lifetime(
    start_time: SystemTime,
    end_time: SystemTime,
    maximum_clock_skew: Duration,
) -> Result<(), KrbError> {
    let lifetime = end_time
        .duration_since(start_time)
        .map_err(|_| KrbError::TgsNeverValid)?;

    if lifetime < maximum_clock_skew {
        return Err(KrbError::TgsNeverValid);
    }

    Ok(())
}

/// The window of a renewed ticket.
pub struct TicketRenewTimeBound {
    start_time: SystemTime,
    end_time: SystemTime,
    renew_until: SystemTime,
}

impl TicketRenewTimeBound {
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn renew_until(&self) -> SystemTime {
        self.renew_until
    }

    /// A renewal preserves the ticket's original lifespan relative to the
    /// new start, capped by the absolute renewal deadline the ticket was
    /// issued with.
    pub(crate) fn evaluate(
        now: SystemTime,
        maximum_clock_skew: Duration,
        request: &TicketGrantRequest,
    ) -> Result<TicketRenewTimeBound, KrbError> {
        let tgt = request.ticket_granting_ticket();

        if !tgt.flags().contains(TicketFlags::Renewable) {
            warn!("denying renewal of a ticket that is not renewable");
            return Err(KrbError::TgsRenewalNotAllowed);
        }

        let Some(renew_until) = tgt.renew_until() else {
            warn!("denying renewal of a ticket that has no renew time");
            return Err(KrbError::TgsRenewalNotAllowed);
        };

        if now > renew_until {
            return Err(KrbError::TgsRenewalExpired);
        }

        let original_lifespan = tgt
            .end_time()
            .duration_since(tgt.start_time())
            .map_err(|_| KrbError::TgsNeverValid)?;

        let start_time = now;
        let end_time = cmp::min(renew_until, now + original_lifespan);

        check_minimum_lifetime(start_time, end_time, maximum_clock_skew)?;

        Ok(TicketRenewTimeBound {
            start_time,
            end_time,
            renew_until,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::transited_encoding::TransitedEncoding;
    use crate::proto::{EncryptionType, Name, SessionKey, Ticket, TicketGrantRequest};

    const SKEW: Duration = Duration::from_secs(300);
    const MAX_LIFE: Duration = Duration::from_secs(3600 * 8);
    const MAX_RENEW: Duration = Duration::from_secs(86400 * 7);

    fn request(
        now: SystemTime,
        tgt_flags: TicketFlags,
        tgt_lifespan: Duration,
        tgt_renew: Option<SystemTime>,
        kdc_options: KdcOptions,
        from: Option<SystemTime>,
        until: SystemTime,
        rtime: Option<SystemTime>,
    ) -> TicketGrantRequest {
        let session_key =
            SessionKey::generate(EncryptionType::AES256_CTS_HMAC_SHA1_96).unwrap();
        TicketGrantRequest {
            nonce: 7,
            service_name: Name::service("host", "files.example.com", "EXAMPLE.COM"),
            kdc_options,
            from,
            until,
            renew: rtime,
            etypes: vec![EncryptionType::AES256_CTS_HMAC_SHA1_96],
            sub_session_key: None,
            client_time: now,
            checksum: None,
            req_body_bytes: Vec::new(),
            addresses: None,
            enc_authorization_data: None,
            ticket: Ticket {
                flags: tgt_flags,
                client_name: Name::principal("alice", "EXAMPLE.COM"),
                session_key,
                auth_time: now - Duration::from_secs(60),
                start_time: now - Duration::from_secs(60),
                end_time: now + tgt_lifespan,
                renew_until: tgt_renew,
                client_addresses: None,
                authorization_data: None,
                transited: TransitedEncoding::empty().unwrap(),
            },
        }
    }

    #[test]
    fn grant_end_is_least_of_the_three_bounds() {
        let now = SystemTime::now();
        let till = now + Duration::from_secs(1800);
        let req = request(
            now,
            TicketFlags::none(),
            Duration::from_secs(3600),
            None,
            KdcOptions::none(),
            None,
            till,
            None,
        );

        let bounds =
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, true, false, &req)
                .unwrap_or_else(|_| panic!("grant refused"));
        assert_eq!(bounds.start_time(), now);
        assert_eq!(bounds.end_time(), till);
        assert_eq!(bounds.renew_until(), None);
    }

    #[test]
    fn grant_end_clamped_by_presented_ticket() {
        let now = SystemTime::now();
        let tgt_life = Duration::from_secs(900);
        let req = request(
            now,
            TicketFlags::none(),
            tgt_life,
            None,
            KdcOptions::none(),
            None,
            now + Duration::from_secs(86400),
            None,
        );

        let bounds =
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, true, false, &req)
                .unwrap_or_else(|_| panic!("grant refused"));
        assert_eq!(bounds.end_time(), now + tgt_life);
    }

    #[test]
    fn grant_window_shorter_than_skew_never_valid() {
        let now = SystemTime::now();
        let req = request(
            now,
            TicketFlags::none(),
            Duration::from_secs(3600),
            None,
            KdcOptions::none(),
            None,
            now + Duration::from_secs(1),
            None,
        );

        assert!(matches!(
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, true, false, &req),
            Err(KrbError::TgsNeverValid)
        ));
    }

    #[test]
    fn grant_future_start_without_postdate_refused() {
        let now = SystemTime::now();
        let req = request(
            now,
            TicketFlags::none(),
            Duration::from_secs(3600),
            None,
            KdcOptions::none(),
            Some(now + Duration::from_secs(7200)),
            now + Duration::from_secs(10800),
            None,
        );

        assert!(matches!(
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, true, false, &req),
            Err(KrbError::TgsCannotPostdate)
        ));
    }

    #[test]
    fn grant_start_within_skew_collapses_to_now() {
        let now = SystemTime::now();
        let req = request(
            now,
            TicketFlags::none(),
            Duration::from_secs(3600),
            None,
            KdcOptions::none(),
            Some(now + Duration::from_secs(60)),
            now + Duration::from_secs(1800),
            None,
        );

        let bounds =
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, true, false, &req)
                .unwrap_or_else(|_| panic!("grant refused"));
        assert_eq!(bounds.start_time(), now);
    }

    #[test]
    fn renewable_ok_upgrades_when_clamped() {
        let now = SystemTime::now();
        let renew_until = now + Duration::from_secs(86400);
        let req = request(
            now,
            TicketFlags::Renewable,
            Duration::from_secs(900),
            Some(renew_until),
            KdcOptions::RenewableOk,
            None,
            now + Duration::from_secs(86400),
            None,
        );

        let bounds =
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, true, false, &req)
                .unwrap_or_else(|_| panic!("grant refused"));
        assert_eq!(bounds.end_time(), now + Duration::from_secs(900));
        assert_eq!(bounds.renew_until(), Some(renew_until));
    }

    #[test]
    fn renewable_ok_no_upgrade_when_policy_forbids() {
        let now = SystemTime::now();
        let req = request(
            now,
            TicketFlags::Renewable,
            Duration::from_secs(900),
            Some(now + Duration::from_secs(86400)),
            KdcOptions::RenewableOk,
            None,
            now + Duration::from_secs(86400),
            None,
        );

        let bounds =
            TicketGrantTimeBound::evaluate(now, SKEW, MAX_LIFE, MAX_RENEW, false, false, &req)
                .unwrap_or_else(|_| panic!("grant refused"));
        assert_eq!(bounds.renew_until(), None);
    }

    #[test]
    fn renewal_preserves_original_lifespan() {
        let now = SystemTime::now();
        let lifespan = Duration::from_secs(3600);
        let renew_until = now + Duration::from_secs(86400);

        let mut req = request(
            now,
            TicketFlags::Renewable,
            lifespan,
            Some(renew_until),
            KdcOptions::Renew,
            None,
            now + Duration::from_secs(3600),
            None,
        );
        // Align the presented window so lifespan is exact.
        req.ticket.start_time = now - Duration::from_secs(600);
        req.ticket.end_time = req.ticket.start_time + lifespan;

        let bounds = TicketRenewTimeBound::evaluate(now, SKEW, &req)
            .unwrap_or_else(|_| panic!("renewal refused"));
        assert_eq!(bounds.start_time(), now);
        assert_eq!(bounds.end_time(), now + lifespan);
        assert_eq!(bounds.renew_until(), renew_until);
    }

    #[test]
    fn renewal_capped_by_renew_until() {
        let now = SystemTime::now();
        let renew_until = now + Duration::from_secs(1200);
        let req = request(
            now,
            TicketFlags::Renewable,
            Duration::from_secs(3600),
            Some(renew_until),
            KdcOptions::Renew,
            None,
            now + Duration::from_secs(3600),
            None,
        );

        let bounds = TicketRenewTimeBound::evaluate(now, SKEW, &req)
            .unwrap_or_else(|_| panic!("renewal refused"));
        assert_eq!(bounds.end_time(), renew_until);
    }

    #[test]
    fn renewal_after_deadline_expired() {
        let now = SystemTime::now();
        let req = request(
            now,
            TicketFlags::Renewable,
            Duration::from_secs(3600),
            Some(now - Duration::from_secs(1)),
            KdcOptions::Renew,
            None,
            now + Duration::from_secs(3600),
            None,
        );

        assert!(matches!(
            TicketRenewTimeBound::evaluate(now, SKEW, &req),
            Err(KrbError::TgsRenewalExpired)
        ));
    }

    #[test]
    fn renewal_of_non_renewable_denied() {
        let now = SystemTime::now();
        let req = request(
            now,
            TicketFlags::none(),
            Duration::from_secs(3600),
            None,
            KdcOptions::Renew,
            None,
            now + Duration::from_secs(3600),
            None,
        );

        assert!(matches!(
            TicketRenewTimeBound::evaluate(now, SKEW, &req),
            Err(KrbError::TgsRenewalNotAllowed)
        ));
    }
}
