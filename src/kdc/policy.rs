//! Maps the requested KDC options onto the new ticket's flags, refusing
//! any option the presented ticket or server policy has not earned. A
//! flag is never silently downgraded - every refusal is a typed error so
//! the client learns exactly why.

use crate::config::KdcPolicy;
use crate::error::KrbError;
use crate::proto::{HostAddress, KdcOptions, TicketFlags, TicketGrantRequest};
use std::time::SystemTime;
use tracing::warn;

/// What the option evaluation decided the rest of the pipeline should do.
pub(crate) enum IssuePlan {
    /// Issue a fresh ticket with these flags; addresses are only present
    /// when FORWARDED or PROXY copied the request's list over.
    Grant {
        flags: TicketFlags,
        client_addresses: Option<Vec<HostAddress>>,
    },
    /// Re-issue the presented ticket with a pushed-out window.
    Renew,
    /// Re-issue the presented ticket with INVALID cleared.
    Validate { flags: TicketFlags },
}

pub(crate) fn evaluate(
    request: &TicketGrantRequest,
    policy: &KdcPolicy,
    now: SystemTime,
) -> Result<IssuePlan, KrbError> {
    let options = *request.kdc_options();
    let tgt = request.ticket_granting_ticket();
    let tgt_flags = *tgt.flags();

    // RESERVED has no defined semantics, so a client setting it is either
    // broken or probing.
    if options.contains(KdcOptions::Reserved) {
        return Err(KrbError::TgsOptionReserved);
    }

    // User-to-user is recognised but not implemented: refuse, never
    // silently ignore the option.
    if options.contains(KdcOptions::EncTktInSkey) {
        warn!("user-to-user requested, unsupported");
        return Err(KrbError::TgsUserToUserUnsupported);
    }

    if options.contains(KdcOptions::Renew) {
        if !policy.allow_renewable {
            return Err(KrbError::TgsPolicyDenied);
        }
        if !tgt_flags.contains(TicketFlags::Renewable) {
            return Err(KrbError::TgsRenewalNotAllowed);
        }
        return Ok(IssuePlan::Renew);
    }

    if options.contains(KdcOptions::Validate) {
        if !policy.allow_postdate {
            return Err(KrbError::TgsPolicyDenied);
        }
        if !tgt_flags.contains(TicketFlags::Invalid) {
            // Validating a ticket that is not INVALID is meaningless.
            return Err(KrbError::TgsPolicyDenied);
        }
        if tgt.start_time() > now || tgt.auth_time() > now {
            return Err(KrbError::TgsTicketNotYetValid);
        }

        let flags = tgt_flags & !TicketFlags::Invalid;
        return Ok(IssuePlan::Validate { flags });
    }

    let mut flags = TicketFlags::none();
    let mut client_addresses: Option<Vec<HostAddress>> = None;

    if options.contains(KdcOptions::Forwardable) {
        if !tgt_flags.contains(TicketFlags::Forwardable) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_forwardable {
            return Err(KrbError::TgsPolicyDenied);
        }
        flags |= TicketFlags::Forwardable;
    }

    // FORWARDED is sticky: once a credential chain has been forwarded,
    // every ticket derived from it says so.
    if tgt_flags.contains(TicketFlags::Forwarded) {
        flags |= TicketFlags::Forwarded;
    }

    if options.contains(KdcOptions::Forwarded) {
        if !tgt_flags.contains(TicketFlags::Forwardable) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_forwardable {
            return Err(KrbError::TgsPolicyDenied);
        }
        if !tgt.has_client_addresses() && !policy.allow_empty_addresses {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        flags |= TicketFlags::Forwarded;
        client_addresses = request.addresses.clone();
    }

    if options.contains(KdcOptions::Proxiable) {
        if !tgt_flags.contains(TicketFlags::Proxiable) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_proxiable {
            return Err(KrbError::TgsPolicyDenied);
        }
        flags |= TicketFlags::Proxiable;
    }

    if options.contains(KdcOptions::Proxy) {
        if !tgt_flags.contains(TicketFlags::Proxiable) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_proxiable {
            return Err(KrbError::TgsPolicyDenied);
        }
        if !tgt.has_client_addresses() && !policy.allow_empty_addresses {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        flags |= TicketFlags::Proxy;
        client_addresses = request.addresses.clone();
    }

    if options.contains(KdcOptions::AllowPostdate) {
        if !tgt_flags.contains(TicketFlags::MayPostdate) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_postdate {
            return Err(KrbError::TgsPolicyDenied);
        }
        flags |= TicketFlags::MayPostdate;
    }

    if options.contains(KdcOptions::Postdated) {
        if !tgt_flags.contains(TicketFlags::MayPostdate) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_postdate {
            return Err(KrbError::TgsPolicyDenied);
        }
        // The ticket is unusable until a VALIDATE exchange clears INVALID
        // after its start time arrives.
        flags |= TicketFlags::Postdated;
        flags |= TicketFlags::Invalid;
    }

    if options.contains(KdcOptions::Renewable) {
        if !tgt_flags.contains(TicketFlags::Renewable) {
            return Err(KrbError::TgsOptionNotPermitted);
        }
        if !policy.allow_renewable {
            return Err(KrbError::TgsPolicyDenied);
        }
        flags |= TicketFlags::Renewable;
    }

    // Informational, not policy gated.
    if tgt_flags.contains(TicketFlags::PreAuthent) {
        flags |= TicketFlags::PreAuthent;
    }

    Ok(IssuePlan::Grant {
        flags,
        client_addresses,
    })
}
