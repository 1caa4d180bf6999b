use crate::asn1::authenticator::{Authenticator, AuthenticatorInner};
use crate::asn1::checksum::Checksum as Asn1Checksum;
use crate::asn1::encryption_key::EncryptionKey as KdcEncryptionKey;
use crate::asn1::kdc_req_body::KdcReqBody as Asn1KdcReqBody;
use crate::asn1::kerberos_time::KerberosTime;
use crate::cksum::ChecksumBuilder;
use crate::error::KrbError;
use crate::kdc::time::is_within_allowed_skew;
use crate::proto::{
    authorization_data_to_asn1, host_addresses_to_asn1, AuthorizationDataEntry, DerivedKey,
    EncTicket, EncryptedData, EncryptionType, HostAddress, KdcOptions, Name, SessionKey, Ticket,
    TicketFlags,
};
use der::Encode;
use rand::{rng, Rng};
use std::time::{Duration, SystemTime};
use tracing::{error, trace};

/// The AP-REQ the codec found inside the PA-TGS-REQ pre-authentication
/// data: the presented ticket, still sealed, and the sealed authenticator.
#[derive(Debug)]
pub struct ApReq {
    pub pvno: u8,
    pub msg_type: u8,
    pub ticket: EncTicket,
    pub authenticator: EncryptedData,
}

#[derive(Debug, Default)]
pub struct Preauth {
    pub tgs_req: Option<ApReq>,
    pub pa_fx_cookie: Option<Vec<u8>>,
}

/// The decoded KDC-REQ-BODY of a TGS-REQ as the message codec hands it
/// over. `etypes` stays as raw wire integers here - negotiation decides
/// which of them this KDC can actually honour.
#[derive(Debug)]
pub struct RequestBody {
    pub kdc_options: KdcOptions,
    pub service_name: Option<Name>,
    pub realm: String,
    pub from: Option<SystemTime>,
    pub till: SystemTime,
    pub rtime: Option<SystemTime>,
    pub nonce: i32,
    pub etypes: Vec<i32>,
    pub addresses: Option<Vec<HostAddress>>,
    pub enc_authorization_data: Option<EncryptedData>,
    pub has_additional_tickets: bool,
}

/// A TGS-REQ before any of its credentials have been checked. The raw
/// body bytes ride along untouched: the authenticator checksum is defined
/// over the bytes that crossed the wire, never a re-serialisation.
#[derive(Debug)]
pub struct TicketGrantRequestUnverified {
    pub preauth: Preauth,
    pub req_body: RequestBody,
    pub req_body_bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct TicketGrantRequest {
    pub(crate) nonce: i32,
    pub(crate) service_name: Name,
    pub(crate) kdc_options: KdcOptions,
    pub(crate) from: Option<SystemTime>,
    pub(crate) until: SystemTime,
    pub(crate) renew: Option<SystemTime>,
    pub(crate) etypes: Vec<EncryptionType>,
    pub(crate) sub_session_key: Option<SessionKey>,
    pub(crate) client_time: SystemTime,
    pub(crate) checksum: Option<Asn1Checksum>,
    pub(crate) req_body_bytes: Vec<u8>,
    pub(crate) addresses: Option<Vec<HostAddress>>,
    pub(crate) enc_authorization_data: Option<EncryptedData>,

    pub(crate) ticket: Ticket,
}

impl TicketGrantRequestUnverified {
    /// Verify the structure and cryptography of the presented credentials:
    /// the AP-REQ must be present and well formed, the ticket must have
    /// been issued by this KDC for this realm (or be renewing itself), and
    /// the authenticator must open under the ticket's session key and name
    /// the ticket's own client.
    ///
    /// `ticket_service_key` is the long term key of the principal the
    /// presented ticket names as its server, which the caller resolved
    /// from the principal store.
    pub fn validate(
        &self,
        ticket_service_key: &DerivedKey,
        realm: &str,
    ) -> Result<TicketGrantRequest, KrbError> {
        let TicketGrantRequestUnverified {
            preauth,
            req_body,
            req_body_bytes,
        } = self;

        let Some(ap_req) = &preauth.tgs_req else {
            return Err(KrbError::TgsMissingPaApReq);
        };

        if ap_req.pvno != 5 || ap_req.msg_type != 14 {
            return Err(KrbError::TgsInvalidPaApReq);
        };

        let ap_req_ticket = &ap_req.ticket;

        trace!(service = %ap_req_ticket.service, "validating presented ticket");

        if ap_req_ticket.service.realm() != realm {
            return Err(KrbError::TgsNotForRealm);
        }

        let presented_service = ap_req_ticket.service.clone().service_hst_normalise();
        let requested_service = req_body
            .service_name
            .clone()
            .map(Name::service_hst_normalise);

        // The presented ticket must name our own ticket granting service,
        // unless a ticket is being used to renew or validate itself.
        if !presented_service.is_service_krbtgt(realm)
            && requested_service.as_ref() != Some(&presented_service)
        {
            error!(%presented_service, "presented ticket is not for this KDC");
            return Err(KrbError::TgsTicketIsNotTgt);
        }

        let enc_ticket_part = ticket_service_key.decrypt_ticket_part(&ap_req_ticket.enc_part)?;

        let session_key = SessionKey::try_from(enc_ticket_part.key.clone())?;

        // Decrypt the authenticator under the session key recovered from
        // the ticket. Only the original recipient of the ticket can have
        // produced it.
        let authenticator = session_key.decrypt_tgs_req_authenticator(&ap_req.authenticator)?;
        let authenticator: AuthenticatorInner = authenticator.into();

        if authenticator.authenticator_vno != 5 {
            return Err(KrbError::TgsInvalidPaApReq);
        }

        let ticket_client = Name::try_from((&enc_ticket_part.cname, &enc_ticket_part.crealm))?;
        let authenticator_client =
            Name::try_from((&authenticator.cname, &authenticator.crealm))?;

        if authenticator_client != ticket_client {
            error!("authenticator does not name the ticket's client");
            return Err(KrbError::TgsAuthenticatorBadmatch);
        }

        let sub_session_key = authenticator
            .subkey
            .map(SessionKey::try_from)
            // Invert the Option<Result> to Result<Option>
            .transpose()?;

        let client_time = authenticator.ctime.to_system_time()
            + Duration::from_micros(authenticator.cusec as u64);

        let ticket = {
            let auth_time = enc_ticket_part.auth_time.to_system_time();

            // RFC4120 5.3: if starttime is absent, authtime stands in.
            let start_time = enc_ticket_part
                .start_time
                .map(|t| t.to_system_time())
                .unwrap_or(auth_time);

            Ticket {
                flags: enc_ticket_part.flags,
                client_name: ticket_client,
                session_key,
                auth_time,
                start_time,
                end_time: enc_ticket_part.end_time.to_system_time(),
                renew_until: enc_ticket_part.renew_till.map(|t| t.to_system_time()),
                client_addresses: enc_ticket_part.client_addresses,
                authorization_data: enc_ticket_part.authorization_data,
                transited: enc_ticket_part.transited,
            }
        };

        let service_name = requested_service.ok_or(KrbError::TgsMissingServiceName)?;

        let etypes = req_body
            .etypes
            .iter()
            .filter_map(|etype| EncryptionType::try_from(*etype).ok())
            .collect();

        Ok(TicketGrantRequest {
            nonce: req_body.nonce,
            service_name,
            kdc_options: req_body.kdc_options,
            from: req_body.from,
            until: req_body.till,
            renew: req_body.rtime,
            etypes,
            sub_session_key,
            client_time,
            checksum: authenticator.cksum.clone(),
            req_body_bytes: req_body_bytes.clone(),
            addresses: req_body.addresses.clone(),
            enc_authorization_data: req_body.enc_authorization_data.clone(),
            ticket,
        })
    }
}

impl TicketGrantRequest {
    pub fn service_name(&self) -> &Name {
        &self.service_name
    }

    pub fn client_time(&self) -> SystemTime {
        self.client_time
    }

    pub fn kdc_options(&self) -> &KdcOptions {
        &self.kdc_options
    }

    pub fn nonce(&self) -> i32 {
        self.nonce
    }

    /// This is the time the client requested the ticket grant to start at. This value
    /// MUST be validated within the bounds of the ticket validity.
    pub fn requested_start_time(&self) -> Option<SystemTime> {
        self.from
    }

    /// This is the time the client requested the ticket grant to end at. This value
    /// MUST be validated within the bounds of the ticket validity.
    pub fn requested_end_time(&self) -> SystemTime {
        self.until
    }

    /// This is the time the client requested the ticket grant to be renewable until.
    /// This value MUST be validated within the bounds of the tickets renewable validity.
    pub fn requested_renew_until(&self) -> Option<SystemTime> {
        self.renew
    }

    /// The cryptographically verified ticket granting ticket that this KDC
    /// issued to the client.
    pub fn ticket_granting_ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn ticket_flags(&self) -> &TicketFlags {
        &self.ticket.flags
    }

    pub fn etypes(&self) -> &[EncryptionType] {
        &self.etypes
    }

    /// The authenticator timestamp must sit inside the acceptable clock
    /// skew of the KDC's own clock.
    pub(crate) fn verify_client_time(
        &self,
        now: SystemTime,
        maximum_clock_skew: Duration,
    ) -> Result<(), KrbError> {
        if is_within_allowed_skew(now, self.client_time, maximum_clock_skew) {
            Ok(())
        } else {
            Err(KrbError::TgsAuthenticatorClockSkew)
        }
    }

    /// The presented ticket itself must currently be usable. An INVALID
    /// ticket is only acceptable when the request is the VALIDATE exchange
    /// that will clear it.
    pub(crate) fn verify_ticket_window(
        &self,
        now: SystemTime,
        maximum_clock_skew: Duration,
    ) -> Result<(), KrbError> {
        let tgt = &self.ticket;

        if tgt.flags.contains(TicketFlags::Invalid) {
            if !self.kdc_options.contains(KdcOptions::Validate) {
                return Err(KrbError::TgsTicketPendingValidation);
            }
            // The future-start test for VALIDATE belongs to the policy
            // engine, which owns that exchange.
            return Ok(());
        }

        if tgt.end_time + maximum_clock_skew < now {
            return Err(KrbError::TgsTicketExpired);
        }

        if tgt.start_time > now + maximum_clock_skew {
            return Err(KrbError::TgsTicketNotYetValid);
        }

        Ok(())
    }

    /// Recompute the checksum the authenticator declared over the retained
    /// request body bytes. Any difference means the body was modified
    /// between the client signing it and us receiving it.
    pub(crate) fn verify_body_checksum(&self) -> Result<(), KrbError> {
        let Some(his_checksum) = &self.checksum else {
            return Err(KrbError::TgsAuthMissingChecksum);
        };

        if self.req_body_bytes.is_empty() {
            return Err(KrbError::TgsInappropriateChecksum);
        }

        let checksum_builder =
            ChecksumBuilder::try_from((his_checksum.checksum_type, &self.ticket.session_key))?;
        let checksum = checksum_builder.compute_kdc_req_body(&self.req_body_bytes)?;

        if checksum != *his_checksum {
            error!("request body checksum mismatch");
            return Err(KrbError::TgsAuthChecksumFailure);
        }

        Ok(())
    }
}

/// Mints a sealed ticket so the tests and the demo can hold a TGT without
/// running an AS exchange. The initial authentication path itself lives
/// in front of this crate.
#[derive(Debug)]
pub struct TicketIssueBuilder {
    service: Name,
    client_name: Name,
    flags: TicketFlags,
    auth_time: SystemTime,
    start_time: SystemTime,
    end_time: SystemTime,
    renew_until: Option<SystemTime>,
    client_addresses: Option<Vec<HostAddress>>,
    authorization_data: Option<Vec<AuthorizationDataEntry>>,
}

impl TicketIssueBuilder {
    pub fn new(
        service: Name,
        client_name: Name,
        auth_time: SystemTime,
        end_time: SystemTime,
    ) -> Self {
        Self {
            service,
            client_name,
            flags: TicketFlags::none(),
            auth_time,
            start_time: auth_time,
            end_time,
            renew_until: None,
            client_addresses: None,
            authorization_data: None,
        }
    }

    pub fn flags(mut self, flags: TicketFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn renew_until(mut self, renew_until: Option<SystemTime>) -> Self {
        self.renew_until = renew_until;
        self
    }

    pub fn client_addresses(mut self, addresses: Vec<HostAddress>) -> Self {
        self.client_addresses = Some(addresses);
        self
    }

    pub fn authorization_data(mut self, entries: Vec<AuthorizationDataEntry>) -> Self {
        self.authorization_data = Some(entries);
        self
    }

    pub fn build(self, service_key: &DerivedKey) -> Result<(EncTicket, SessionKey), KrbError> {
        let session_key = SessionKey::generate(service_key.etype())?;

        let to_kerberos_time = |t: SystemTime| {
            KerberosTime::from_system_time(t).map_err(|_| KrbError::DerEncodeKerberosTime)
        };

        let ticket_inner = crate::asn1::enc_ticket_part::EncTicketPart {
            flags: self.flags,
            key: (&session_key).try_into()?,
            crealm: (&self.client_name).try_into()?,
            cname: (&self.client_name).try_into()?,
            transited: crate::asn1::transited_encoding::TransitedEncoding::empty()
                .map_err(|_| KrbError::DerEncodeOctetString)?,
            auth_time: to_kerberos_time(self.auth_time)?,
            start_time: Some(to_kerberos_time(self.start_time)?),
            end_time: to_kerberos_time(self.end_time)?,
            renew_till: self.renew_until.map(to_kerberos_time).transpose()?,
            client_addresses: self
                .client_addresses
                .as_deref()
                .map(host_addresses_to_asn1)
                .transpose()?,
            authorization_data: self
                .authorization_data
                .as_deref()
                .map(authorization_data_to_asn1)
                .transpose()?,
        };

        let enc_part = service_key.encrypt_ticket_part(ticket_inner)?;

        Ok((EncTicket::new(self.service, enc_part), session_key))
    }
}

#[derive(Debug)]
struct ApReqBuilder {
    client_name: Name,
    ticket: EncTicket,
    session_key: SessionKey,
}

/// The client half of the TGS exchange: assembles the decoded request,
/// serialises the body, checksums it and seals the authenticator, exactly
/// as a real client stub would before framing it for the wire.
#[derive(Debug)]
pub struct TicketGrantRequestBuilder {
    service_name: Name,
    client_time: SystemTime,
    from: Option<SystemTime>,
    until: SystemTime,
    renew: Option<SystemTime>,
    etypes: Vec<EncryptionType>,
    kdc_options: KdcOptions,
    sub_session_key: Option<SessionKey>,
    addresses: Option<Vec<HostAddress>>,
    authorization_data: Option<Vec<AuthorizationDataEntry>>,
    ap_req_builder: Option<ApReqBuilder>,
}

impl TicketGrantRequestBuilder {
    pub fn new(service_name: Name, now: SystemTime, until: SystemTime) -> Self {
        let etypes = vec![EncryptionType::AES256_CTS_HMAC_SHA1_96];
        Self {
            service_name,
            client_time: now,
            from: None,
            until,
            renew: None,
            etypes,
            kdc_options: KdcOptions::none(),
            sub_session_key: None,
            addresses: None,
            authorization_data: None,
            ap_req_builder: None,
        }
    }

    pub fn kdc_options(mut self, kdc_options: KdcOptions) -> Self {
        self.kdc_options = kdc_options;
        self
    }

    pub fn etypes(mut self, etypes: Vec<EncryptionType>) -> Self {
        self.etypes = etypes;
        self
    }

    pub fn from(mut self, from: Option<SystemTime>) -> Self {
        self.from = from;
        self
    }

    pub fn renew_until(mut self, renew: Option<SystemTime>) -> Self {
        self.renew = renew;
        self
    }

    pub fn sub_session_key(mut self, sub_session_key: SessionKey) -> Self {
        self.sub_session_key = Some(sub_session_key);
        self
    }

    pub fn addresses(mut self, addresses: Vec<HostAddress>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn authorization_data(mut self, entries: Vec<AuthorizationDataEntry>) -> Self {
        self.authorization_data = Some(entries);
        self
    }

    pub fn preauth_ap_req(
        mut self,
        client: &Name,
        ticket: &EncTicket,
        session_key: &SessionKey,
    ) -> Result<Self, KrbError> {
        self.ap_req_builder = Some(ApReqBuilder {
            client_name: client.clone(),
            ticket: ticket.clone(),
            session_key: session_key.clone(),
        });
        Ok(self)
    }

    pub fn build(self) -> Result<TicketGrantRequestUnverified, KrbError> {
        let TicketGrantRequestBuilder {
            service_name,
            client_time,
            from,
            until,
            renew,
            etypes,
            kdc_options,
            sub_session_key,
            addresses,
            authorization_data,
            ap_req_builder,
        } = self;

        let ap_req_builder = ap_req_builder.ok_or(KrbError::TgsMissingPaApReq)?;

        // MIT krb5 rejects nonces above i32::MAX as "ASN.1 value too
        // large", while Heimdal happily sends negative ones. Stay positive.
        let nonce: i32 = rng().random();
        let nonce = nonce.abs();

        let etype_ints: Vec<i32> = etypes.iter().map(|e| *e as i32).collect();

        // The request's own authorization data travels sealed, under the
        // sub-session key when one exists, else the ticket session key.
        let enc_authorization_data = authorization_data
            .as_deref()
            .map(|entries| {
                let asn1_entries = authorization_data_to_asn1(entries)?;
                match &sub_session_key {
                    Some(sub_key) => sub_key.encrypt_authorization_data(&asn1_entries, true),
                    None => ap_req_builder
                        .session_key
                        .encrypt_authorization_data(&asn1_entries, false),
                }
            })
            .transpose()?;

        let to_kerberos_time = |t: SystemTime| {
            KerberosTime::from_system_time(t).map_err(|_| KrbError::DerEncodeKerberosTime)
        };

        let req_body_asn1 = Asn1KdcReqBody {
            kdc_options,
            cname: None,
            realm: (&service_name).try_into()?,
            sname: Some((&service_name).try_into()?),
            from: from.map(to_kerberos_time).transpose()?,
            till: to_kerberos_time(until)?,
            rtime: renew.map(to_kerberos_time).transpose()?,
            nonce,
            etype: etype_ints.clone(),
            addresses: addresses
                .as_deref()
                .map(host_addresses_to_asn1)
                .transpose()?,
            enc_authorization_data: enc_authorization_data
                .as_ref()
                .map(TryInto::try_into)
                .transpose()?,
        };

        // These bytes are what the wire carries; the checksum in the
        // authenticator is computed over the KDC-REQ-BODY encoding.
        let req_body_bytes = req_body_asn1
            .to_der()
            .map_err(|_| KrbError::DerEncodeKdcReqBody)?;

        let checksum_builder = ChecksumBuilder::from(&ap_req_builder.session_key);
        let checksum = checksum_builder.compute_kdc_req_body(&req_body_bytes)?;

        let subkey: Option<KdcEncryptionKey> = sub_session_key
            .as_ref()
            .map(TryInto::try_into)
            .transpose()?;

        let authenticator: Authenticator = Authenticator::new(
            (&ap_req_builder.client_name).try_into()?,
            (&ap_req_builder.client_name).try_into()?,
            client_time,
            Some(checksum),
            subkey,
            None,
            None,
        )?;

        let authenticator = ap_req_builder
            .session_key
            .encrypt_tgs_req_authenticator(&authenticator)?;

        let ap_req = ApReq {
            pvno: 5,
            msg_type: 14,
            ticket: ap_req_builder.ticket,
            authenticator,
        };

        let req_body = RequestBody {
            kdc_options,
            service_name: Some(service_name.clone()),
            realm: service_name.realm().to_string(),
            from,
            till: until,
            rtime: renew,
            nonce,
            etypes: etype_ints,
            addresses,
            enc_authorization_data,
            has_additional_tickets: false,
        };

        Ok(TicketGrantRequestUnverified {
            preauth: Preauth {
                tgs_req: Some(ap_req),
                pa_fx_cookie: None,
            },
            req_body,
            req_body_bytes,
        })
    }
}
