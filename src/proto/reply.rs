use crate::asn1::authorization_data::AuthorizationData;
use crate::asn1::enc_kdc_rep_part::EncKdcRepPart;
use crate::asn1::enc_ticket_part::EncTicketPart;
use crate::asn1::kerberos_time::KerberosTime;
use crate::error::KrbError;
use crate::kdc::time::TicketGrantTimeBound;
use crate::proto::{
    host_addresses_to_asn1, DerivedKey, EncTicket, EncryptedData, EncryptionType, HostAddress,
    KrbErrorCode, Name, SessionKey, TicketFlags, TicketGrantRequest,
};
use std::time::SystemTime;

/// Everything the client needs to use the new ticket: the sealed ticket
/// itself and the sealed reply part carrying the session key, flags,
/// window and nonce echo.
#[derive(Debug)]
pub struct TicketGrantReply {
    pub client_name: Name,
    pub enc_part: EncryptedData,
    pub ticket: EncTicket,
}

#[derive(Debug)]
pub struct ErrorReply {
    code: KrbErrorCode,
    service: Name,
    error_text: Option<String>,
    server_time: SystemTime,
}

impl ErrorReply {
    pub fn code(&self) -> KrbErrorCode {
        self.code
    }

    pub fn service(&self) -> &Name {
        &self.service
    }

    pub fn text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    pub fn server_time(&self) -> SystemTime {
        self.server_time
    }
}

/// What goes back on the wire: either a sealed TGS-REP or a KRB-ERROR.
/// Raw errors never cross the protocol boundary.
#[derive(Debug)]
pub enum KerberosReply {
    TGS(TicketGrantReply),
    ERR(ErrorReply),
}

impl KerberosReply {
    /// Terminal state of the pipeline for any failed request: the typed
    /// error becomes a KRB-ERROR naming the local KDC service, carrying
    /// the RFC numbered code and its fixed explanatory text.
    pub fn error_reply(err: KrbError, service: Name, stime: SystemTime) -> KerberosReply {
        KerberosReply::ERR(ErrorReply {
            code: err.error_code(),
            service,
            error_text: Some(err.error_text().to_string()),
            server_time: stime,
        })
    }
}

/// The decrypted view of a reply part, for the client side of the
/// exchange and for tests that refuse to trust the sealer.
#[derive(Debug)]
pub struct ReplyPart {
    pub key: SessionKey,
    pub nonce: i32,
    pub flags: TicketFlags,
    pub auth_time: SystemTime,
    pub start_time: Option<SystemTime>,
    pub end_time: SystemTime,
    pub renew_until: Option<SystemTime>,
    pub server: Name,
}

impl TicketGrantReply {
    /// Open the sealed reply part. `is_sub_session_key` must match how the
    /// request was made - the sub-session key seal and the session key
    /// seal use distinct key usage numbers.
    pub fn decrypt_reply_part(
        &self,
        key: &SessionKey,
        is_sub_session_key: bool,
    ) -> Result<ReplyPart, KrbError> {
        let part = key.decrypt_tgs_rep_part(&self.enc_part, is_sub_session_key)?;

        let server = Name::try_from((&part.server_name, &part.server_realm))?;
        let key = SessionKey::try_from(part.key)?;

        Ok(ReplyPart {
            key,
            nonce: part.nonce,
            flags: part.flags,
            auth_time: part.auth_time.to_system_time(),
            start_time: part.start_time.map(|t| t.to_system_time()),
            end_time: part.end_time.to_system_time(),
            renew_until: part.renew_till.map(|t| t.to_system_time()),
            server,
        })
    }
}

fn to_kerberos_time(t: SystemTime) -> Result<KerberosTime, KrbError> {
    KerberosTime::from_system_time(t).map_err(|_| KrbError::DerEncodeKerberosTime)
}

/// Assembles and seals a brand new service ticket. The ticket body is
/// sealed under the target service's long term key with the ticket key
/// usage; the reply part under the authenticator sub-session key if one
/// was sent, else the TGT session key, each with its own reply key usage.
pub struct TicketGrantReplyBuilder {
    request: TicketGrantRequest,
    etype: EncryptionType,
    flags: TicketFlags,
    time_bounds: TicketGrantTimeBound,
    client_addresses: Option<Vec<HostAddress>>,
}

impl TicketGrantReplyBuilder {
    pub(crate) fn new(
        request: TicketGrantRequest,
        etype: EncryptionType,
        flags: TicketFlags,
        time_bounds: TicketGrantTimeBound,
    ) -> Self {
        Self {
            request,
            etype,
            flags,
            time_bounds,
            client_addresses: None,
        }
    }

    pub(crate) fn client_addresses(mut self, addresses: Option<Vec<HostAddress>>) -> Self {
        self.client_addresses = addresses;
        self
    }

    pub(crate) fn build(mut self, service_key: &DerivedKey) -> Result<KerberosReply, KrbError> {
        if self.time_bounds.renew_until().is_some() {
            // This also surfaces the RENEWABLE-OK upgrade: the flag is
            // computed once and sealed into both the ticket and the
            // visible reply.
            self.flags |= TicketFlags::Renewable;
        }

        let service_session_key = SessionKey::generate(self.etype)?;

        let TicketGrantRequest {
            nonce,
            service_name,
            sub_session_key,
            enc_authorization_data,
            ticket,
            ..
        } = self.request;

        // The request's own sealed authorization data is opened under the
        // sub-session key when present, then the presented ticket's
        // restrictions are appended. Restrictions only ever accumulate.
        let request_authz: Option<Vec<AuthorizationData>> = enc_authorization_data
            .as_ref()
            .map(|enc| match &sub_session_key {
                Some(sub_key) => sub_key.decrypt_authorization_data(enc, true),
                None => ticket.session_key.decrypt_authorization_data(enc, false),
            })
            .transpose()?;

        let mut authorization_data = request_authz.unwrap_or_default();
        if let Some(tgt_authz) = &ticket.authorization_data {
            authorization_data.extend(tgt_authz.iter().cloned());
        }
        let authorization_data = if authorization_data.is_empty() {
            None
        } else {
            Some(authorization_data)
        };

        let client_addresses = self
            .client_addresses
            .as_deref()
            .map(host_addresses_to_asn1)
            .transpose()?;

        let auth_time = to_kerberos_time(ticket.auth_time)?;
        let start_time = Some(to_kerberos_time(self.time_bounds.start_time())?);
        let end_time = to_kerberos_time(self.time_bounds.end_time())?;
        let renew_till = self
            .time_bounds
            .renew_until()
            .map(to_kerberos_time)
            .transpose()?;

        let ticket_inner = EncTicketPart {
            flags: self.flags,
            key: (&service_session_key).try_into()?,
            crealm: (&ticket.client_name).try_into()?,
            cname: (&ticket.client_name).try_into()?,
            // No transit has occured, carry the presented encoding through.
            transited: ticket.transited.clone(),
            auth_time,
            start_time,
            end_time,
            renew_till,
            client_addresses: client_addresses.clone(),
            authorization_data,
        };

        let enc_kdc_rep_part = EncKdcRepPart {
            key: (&service_session_key).try_into()?,
            last_req: Vec::with_capacity(0),
            nonce,
            key_expiration: None,
            flags: self.flags,
            auth_time,
            start_time,
            end_time,
            renew_till,
            server_realm: (&service_name).try_into()?,
            server_name: (&service_name).try_into()?,
            client_addresses,
        };

        // Reply seal first: a failure here must not leave a half-issued
        // ticket observable anywhere.
        let enc_part = if let Some(sub_session_key) = &sub_session_key {
            sub_session_key.encrypt_tgs_rep_part(enc_kdc_rep_part, true)?
        } else {
            ticket
                .session_key
                .encrypt_tgs_rep_part(enc_kdc_rep_part, false)?
        };

        let ticket_enc_part = service_key.encrypt_ticket_part(ticket_inner)?;

        Ok(KerberosReply::TGS(TicketGrantReply {
            client_name: ticket.client_name,
            enc_part,
            ticket: EncTicket::new(service_name, ticket_enc_part),
        }))
    }
}

/// Seals the echo shaped replies: RENEW and VALIDATE both re-issue the
/// presented ticket's fields with adjusted flags and window rather than
/// deriving new ones.
pub struct TicketRenewReplyBuilder {
    request: TicketGrantRequest,
    etype: EncryptionType,
    flags: TicketFlags,
    start_time: SystemTime,
    end_time: SystemTime,
    renew_until: Option<SystemTime>,
}

impl TicketRenewReplyBuilder {
    pub(crate) fn new(
        request: TicketGrantRequest,
        etype: EncryptionType,
        flags: TicketFlags,
        start_time: SystemTime,
        end_time: SystemTime,
        renew_until: Option<SystemTime>,
    ) -> Self {
        Self {
            request,
            etype,
            flags,
            start_time,
            end_time,
            renew_until,
        }
    }

    pub(crate) fn build(self, service_key: &DerivedKey) -> Result<KerberosReply, KrbError> {
        let session_key = SessionKey::generate(self.etype)?;

        let TicketGrantRequest {
            nonce,
            service_name,
            sub_session_key,
            ticket,
            ..
        } = self.request;

        let auth_time = to_kerberos_time(ticket.auth_time)?;
        let start_time = Some(to_kerberos_time(self.start_time)?);
        let end_time = to_kerberos_time(self.end_time)?;
        let renew_till = self.renew_until.map(to_kerberos_time).transpose()?;

        let ticket_inner = EncTicketPart {
            flags: self.flags,
            key: (&session_key).try_into()?,
            crealm: (&ticket.client_name).try_into()?,
            cname: (&ticket.client_name).try_into()?,
            transited: ticket.transited.clone(),
            auth_time,
            start_time,
            end_time,
            renew_till,
            client_addresses: ticket.client_addresses.clone(),
            authorization_data: ticket.authorization_data.clone(),
        };

        let enc_kdc_rep_part = EncKdcRepPart {
            key: (&session_key).try_into()?,
            last_req: Vec::with_capacity(0),
            nonce,
            key_expiration: None,
            flags: self.flags,
            auth_time,
            start_time,
            end_time,
            renew_till,
            server_realm: (&service_name).try_into()?,
            server_name: (&service_name).try_into()?,
            client_addresses: ticket.client_addresses.clone(),
        };

        let enc_part = if let Some(sub_session_key) = &sub_session_key {
            sub_session_key.encrypt_tgs_rep_part(enc_kdc_rep_part, true)?
        } else {
            ticket
                .session_key
                .encrypt_tgs_rep_part(enc_kdc_rep_part, false)?
        };

        let ticket_enc_part = service_key.encrypt_ticket_part(ticket_inner)?;

        Ok(KerberosReply::TGS(TicketGrantReply {
            client_name: ticket.client_name,
            enc_part,
            ticket: EncTicket::new(service_name, ticket_enc_part),
        }))
    }
}
