mod reply;
mod request;

pub use self::reply::{
    KerberosReply, ReplyPart, TicketGrantReply, TicketGrantReplyBuilder, TicketRenewReplyBuilder,
};
pub use self::request::{
    ApReq, Preauth, RequestBody, TicketGrantRequest, TicketGrantRequestBuilder,
    TicketGrantRequestUnverified, TicketIssueBuilder,
};

pub use crate::asn1::constants::{EncryptionType, KrbErrorCode};
pub use crate::asn1::ticket_flags::TicketFlags;

use crate::asn1::authenticator::Authenticator;
use crate::asn1::authorization_data::AuthorizationData;
use crate::asn1::constants::PrincipalNameType;
use crate::asn1::enc_kdc_rep_part::{EncKdcRepPart, TaggedEncTgsRepPart};
use crate::asn1::enc_ticket_part::{EncTicketPart, TaggedEncTicketPart};
use crate::asn1::encrypted_data::EncryptedData as KdcEncryptedData;
use crate::asn1::encryption_key::EncryptionKey as KdcEncryptionKey;
use crate::asn1::host_address::HostAddresses;
use crate::asn1::kerberos_string::{KerberosString, Realm};
use crate::asn1::principal_name::PrincipalName;
use crate::asn1::transited_encoding::TransitedEncoding;
use crate::asn1::{Ia5String, OctetString};
use crate::constants::{
    AES_256_KEY_LEN, KEY_USAGE_TGS_REP_SESSION, KEY_USAGE_TGS_REP_SUBKEY,
    KEY_USAGE_TGS_REQ_AUTHENTICATOR, KEY_USAGE_TGS_REQ_AUTHZ_SESSION,
    KEY_USAGE_TGS_REQ_AUTHZ_SUBKEY, KEY_USAGE_TICKET,
};
use crate::crypto::{
    checksum_hmac_sha1_96_aes256, decrypt_aes256_cts_hmac_sha1_96,
    derive_key_aes256_cts_hmac_sha1_96, encrypt_aes256_cts_hmac_sha1_96,
};
use crate::error::KrbError;
use bitmask_enum::bitmask;
use der::{Decode, Encode};
use rand::{rng, Rng};
use std::fmt;
use std::time::SystemTime;
use tracing::{error, trace};

/// ```text
/// KDCOptions      ::= KerberosFlags
/// ````
/// The options a client may request on a TGS-REQ. RFC4120 numbers the
/// flag bits MSB first; the message codec is responsible for that wire
/// mapping, this is the in-memory view.
#[bitmask(u32)]
pub enum KdcOptions {
    Reserved = 1 << 0,
    Forwardable = 1 << 1,
    Forwarded = 1 << 2,
    Proxiable = 1 << 3,
    Proxy = 1 << 4,
    AllowPostdate = 1 << 5,
    Postdated = 1 << 6,
    Unused7 = 1 << 7,
    Renewable = 1 << 8,
    Unused9 = 1 << 9,
    Unused10 = 1 << 10,
    OptHardwareAuth = 1 << 11,
    Unused12 = 1 << 12,
    Unused13 = 1 << 13,
    Unused14 = 1 << 14,
    Canonicalize = 1 << 15,
    DisableTransitedCheck = 1 << 26,
    RenewableOk = 1 << 27,
    EncTktInSkey = 1 << 28,
    Renew = 1 << 30,
    Validate = 1 << 31,
}

impl KdcOptions {
    fn from_bits(val: u32) -> Self {
        let mut options = KdcOptions::none();
        options.bits = val;
        options
    }
}

// NOTE: Can't use der::Flagset because it strips all leading zeros and RFC4120
// section 5.8.2 says at least 32 bit must be sent.
impl<'a> der::Decode<'a> for KdcOptions {
    type Error = der::Error;

    fn decode<R: der::Reader<'a>>(decoder: &mut R) -> der::Result<Self> {
        let bs = der::asn1::BitStringRef::decode(decoder)?;
        let bytes: [u8; 4] = bs.raw_bytes().try_into().map_err(|_| {
            der::Error::new(
                der::ErrorKind::Incomplete {
                    expected_len: der::Length::new(4),
                    actual_len: decoder.position(),
                },
                decoder.position(),
            )
        })?;
        let bits = u32::from_be_bytes(bytes);
        let mut swap = 0u32;
        for i in 0..32 {
            let on = bits & (1 << i);
            swap |= on >> i << (32 - i - 1);
        }
        Ok(KdcOptions::from_bits(swap))
    }
}

impl der::Tagged for KdcOptions {
    fn tag(&self) -> der::Tag {
        der::Tag::BitString
    }
}

impl der::EncodeValue for KdcOptions {
    fn value_len(&self) -> der::Result<der::Length> {
        let bits = self.bits();
        let buff = &bits.to_be_bytes();
        let bs = der::asn1::BitStringRef::from_bytes(buff)?;
        bs.value_len()
    }
    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        let bits = self.bits();
        let mut reversed = 0u32;
        for i in 0..32 {
            let on = bits & (1 << i);
            reversed |= on >> i << (32 - i - 1);
        }
        let buff = &reversed.to_be_bytes();
        let bs = der::asn1::BitStringRef::from_bytes(buff)?;
        bs.encode_value(encoder)
    }
}

/// A client address as the codec hands it over - address family number
/// and the raw address bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub addr_type: i32,
    pub address: Vec<u8>,
}

impl TryFrom<&HostAddress> for crate::asn1::host_address::HostAddress {
    type Error = KrbError;

    fn try_from(addr: &HostAddress) -> Result<Self, Self::Error> {
        Ok(crate::asn1::host_address::HostAddress {
            addr_type: addr.addr_type,
            address: OctetString::new(addr.address.clone())
                .map_err(|_| KrbError::DerEncodeOctetString)?,
        })
    }
}

impl From<&crate::asn1::host_address::HostAddress> for HostAddress {
    fn from(addr: &crate::asn1::host_address::HostAddress) -> Self {
        HostAddress {
            addr_type: addr.addr_type,
            address: addr.address.as_bytes().to_vec(),
        }
    }
}

pub(crate) fn host_addresses_to_asn1(
    addrs: &[HostAddress],
) -> Result<HostAddresses, KrbError> {
    addrs.iter().map(TryInto::try_into).collect()
}

/// One authorization data element as the codec hands it over. These are
/// restrictions; the TGS carries them, it never interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationDataEntry {
    pub ad_type: i32,
    pub ad_data: Vec<u8>,
}

impl TryFrom<&AuthorizationDataEntry> for AuthorizationData {
    type Error = KrbError;

    fn try_from(entry: &AuthorizationDataEntry) -> Result<Self, Self::Error> {
        Ok(AuthorizationData {
            ad_type: entry.ad_type,
            ad_data: OctetString::new(entry.ad_data.clone())
                .map_err(|_| KrbError::DerEncodeOctetString)?,
        })
    }
}

impl From<&AuthorizationData> for AuthorizationDataEntry {
    fn from(ad: &AuthorizationData) -> Self {
        AuthorizationDataEntry {
            ad_type: ad.ad_type,
            ad_data: ad.ad_data.as_bytes().to_vec(),
        }
    }
}

pub(crate) fn authorization_data_to_asn1(
    entries: &[AuthorizationDataEntry],
) -> Result<Vec<AuthorizationData>, KrbError> {
    entries.iter().map(TryInto::try_into).collect()
}

#[derive(Clone, PartialEq, Eq)]
pub enum DerivedKey {
    Aes256CtsHmacSha196 {
        k: [u8; AES_256_KEY_LEN],
        i: u32,
        s: String,
        kvno: u32,
    },
}

impl DerivedKey {
    pub fn new_aes256_cts_hmac_sha1_96(
        passphrase: &str,
        salt: &str,
        iter_count: u32,
        kvno: u32,
    ) -> Result<Self, KrbError> {
        if passphrase.len() < 16 {
            // Due to how the cryptography of KRB works, we need to ensure not only that the
            // password is long, but also that the pbkdf2 rounds are high.
            return Err(KrbError::InsecurePassphrase);
        }

        derive_key_aes256_cts_hmac_sha1_96(passphrase.as_bytes(), salt.as_bytes(), iter_count).map(
            |k| DerivedKey::Aes256CtsHmacSha196 {
                k,
                i: iter_count,
                s: salt.to_string(),
                kvno,
            },
        )
    }

    /// Wrap raw key material, for keys that were provisioned rather than
    /// derived from a passphrase - the KDC's own krbtgt key among them.
    pub fn from_raw_aes256(key: &[u8], kvno: u32) -> Result<Self, KrbError> {
        if key.len() != AES_256_KEY_LEN {
            error!(key_len = %key.len(), expected = %AES_256_KEY_LEN);
            return Err(KrbError::InvalidEncryptionKey);
        }
        let mut k = [0u8; AES_256_KEY_LEN];
        k.copy_from_slice(key);
        Ok(DerivedKey::Aes256CtsHmacSha196 {
            k,
            i: 0,
            s: String::new(),
            kvno,
        })
    }

    pub fn etype(&self) -> EncryptionType {
        match self {
            DerivedKey::Aes256CtsHmacSha196 { .. } => EncryptionType::AES256_CTS_HMAC_SHA1_96,
        }
    }

    pub(crate) fn encrypt_ticket_part(
        &self,
        ticket_inner: EncTicketPart,
    ) -> Result<EncryptedData, KrbError> {
        let data = TaggedEncTicketPart(ticket_inner)
            .to_der()
            .map_err(|_| KrbError::DerEncodeEncTicketPart)?;

        match self {
            DerivedKey::Aes256CtsHmacSha196 { k, kvno, .. } => {
                let data = encrypt_aes256_cts_hmac_sha1_96(k, &data, KEY_USAGE_TICKET)?;
                Ok(EncryptedData::Aes256CtsHmacSha196 {
                    kvno: Some(*kvno),
                    data,
                })
            }
        }
    }

    pub(crate) fn decrypt_ticket_part(
        &self,
        enc_data: &EncryptedData,
    ) -> Result<EncTicketPart, KrbError> {
        let data = match (enc_data, self) {
            (
                EncryptedData::Aes256CtsHmacSha196 { kvno: _, data },
                DerivedKey::Aes256CtsHmacSha196 { k, .. },
            ) => decrypt_aes256_cts_hmac_sha1_96(k, data, KEY_USAGE_TICKET)?,
            (EncryptedData::Opaque { .. }, _) => return Err(KrbError::UnsupportedEncryption),
        };

        TaggedEncTicketPart::from_der(&data)
            .map_err(|err| {
                error!(?err, "DerDecodeEncTicketPart");
                KrbError::DerDecodeEncTicketPart
            })
            .map(|TaggedEncTicketPart(part)| part)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("DerivedKey");
        match self {
            DerivedKey::Aes256CtsHmacSha196 { i, s, .. } => builder
                .field("k", &"Aes256HmacSha1")
                .field("i", i)
                .field("s", s),
        }
        .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum SessionKey {
    Aes256CtsHmacSha196 { k: [u8; AES_256_KEY_LEN] },
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("SessionKey");
        match self {
            SessionKey::Aes256CtsHmacSha196 { .. } => builder.field("k", &"Aes256"),
        }
        .finish()
    }
}

impl SessionKey {
    /// Mint a fresh random key sized for the negotiated encryption type.
    pub fn generate(etype: EncryptionType) -> Result<Self, KrbError> {
        match etype {
            EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
                let mut k = [0u8; AES_256_KEY_LEN];
                rng().fill(&mut k);
                Ok(SessionKey::Aes256CtsHmacSha196 { k })
            }
            _ => Err(KrbError::UnsupportedEncryption),
        }
    }

    pub(crate) fn etype(&self) -> EncryptionType {
        match self {
            SessionKey::Aes256CtsHmacSha196 { .. } => EncryptionType::AES256_CTS_HMAC_SHA1_96,
        }
    }

    pub(crate) fn decrypt_tgs_req_authenticator(
        &self,
        enc_data: &EncryptedData,
    ) -> Result<Authenticator, KrbError> {
        let data = match (enc_data, self) {
            (
                EncryptedData::Aes256CtsHmacSha196 { kvno: _, data },
                SessionKey::Aes256CtsHmacSha196 { k },
            ) => decrypt_aes256_cts_hmac_sha1_96(k, data, KEY_USAGE_TGS_REQ_AUTHENTICATOR)?,
            (EncryptedData::Opaque { .. }, SessionKey::Aes256CtsHmacSha196 { .. }) => {
                return Err(KrbError::UnsupportedEncryption)
            }
        };

        Authenticator::from_der(&data).map_err(|_| KrbError::DerDecodeAuthenticator)
    }

    pub(crate) fn encrypt_tgs_req_authenticator(
        &self,
        authenticator: &Authenticator,
    ) -> Result<EncryptedData, KrbError> {
        let data = authenticator
            .to_der()
            .map_err(|_| KrbError::DerEncodeAuthenticator)?;

        match self {
            SessionKey::Aes256CtsHmacSha196 { k } => {
                encrypt_aes256_cts_hmac_sha1_96(k, &data, KEY_USAGE_TGS_REQ_AUTHENTICATOR)
                    .map(|data| EncryptedData::Aes256CtsHmacSha196 { kvno: None, data })
            }
        }
    }

    /// Seal the reply part. The ciphertext is encrypted with the
    /// sub-session key from the authenticator; if absent, the ticket
    /// session key is used. Each of the two choices has its own key usage
    /// number and the two must never be interchanged.
    pub(crate) fn encrypt_tgs_rep_part(
        &self,
        enc_kdc_rep_part: EncKdcRepPart,
        is_sub_session_key: bool,
    ) -> Result<EncryptedData, KrbError> {
        let data = TaggedEncTgsRepPart(enc_kdc_rep_part)
            .to_der()
            .map_err(|_| KrbError::DerEncodeEncKdcRepPart)?;

        let (key_usage, kvno) = if is_sub_session_key {
            (KEY_USAGE_TGS_REP_SUBKEY, Some(5))
        } else {
            (KEY_USAGE_TGS_REP_SESSION, None)
        };

        match self {
            SessionKey::Aes256CtsHmacSha196 { k } => {
                let data = encrypt_aes256_cts_hmac_sha1_96(k, &data, key_usage)?;
                Ok(EncryptedData::Aes256CtsHmacSha196 { kvno, data })
            }
        }
    }

    pub(crate) fn decrypt_tgs_rep_part(
        &self,
        enc_data: &EncryptedData,
        is_sub_session_key: bool,
    ) -> Result<EncKdcRepPart, KrbError> {
        let key_usage = if is_sub_session_key {
            KEY_USAGE_TGS_REP_SUBKEY
        } else {
            KEY_USAGE_TGS_REP_SESSION
        };

        let data = match (enc_data, self) {
            (
                EncryptedData::Aes256CtsHmacSha196 { kvno: _, data },
                SessionKey::Aes256CtsHmacSha196 { k },
            ) => decrypt_aes256_cts_hmac_sha1_96(k, data, key_usage)?,
            (EncryptedData::Opaque { .. }, SessionKey::Aes256CtsHmacSha196 { .. }) => {
                return Err(KrbError::UnsupportedEncryption)
            }
        };

        TaggedEncTgsRepPart::from_der(&data)
            .map_err(|err| {
                error!(?err, "DerDecodeEncKdcRepPart");
                KrbError::DerDecodeEncKdcRepPart
            })
            .map(|TaggedEncTgsRepPart(part)| part)
    }

    /// Open the request's own sealed authorization data. Usage 5 when the
    /// seal was made under the authenticator sub-session key, usage 4
    /// under the ticket session key.
    pub(crate) fn decrypt_authorization_data(
        &self,
        enc_data: &EncryptedData,
        is_sub_session_key: bool,
    ) -> Result<Vec<AuthorizationData>, KrbError> {
        let key_usage = if is_sub_session_key {
            KEY_USAGE_TGS_REQ_AUTHZ_SUBKEY
        } else {
            KEY_USAGE_TGS_REQ_AUTHZ_SESSION
        };

        let data = match (enc_data, self) {
            (
                EncryptedData::Aes256CtsHmacSha196 { kvno: _, data },
                SessionKey::Aes256CtsHmacSha196 { k },
            ) => decrypt_aes256_cts_hmac_sha1_96(k, data, key_usage)?,
            (EncryptedData::Opaque { .. }, SessionKey::Aes256CtsHmacSha196 { .. }) => {
                return Err(KrbError::UnsupportedEncryption)
            }
        };

        Vec::<AuthorizationData>::from_der(&data).map_err(|_| KrbError::DerDecodeAuthorizationData)
    }

    pub(crate) fn encrypt_authorization_data(
        &self,
        authorization_data: &[AuthorizationData],
        is_sub_session_key: bool,
    ) -> Result<EncryptedData, KrbError> {
        let data = authorization_data
            .to_vec()
            .to_der()
            .map_err(|_| KrbError::DerEncodeOctetString)?;

        let key_usage = if is_sub_session_key {
            KEY_USAGE_TGS_REQ_AUTHZ_SUBKEY
        } else {
            KEY_USAGE_TGS_REQ_AUTHZ_SESSION
        };

        match self {
            SessionKey::Aes256CtsHmacSha196 { k } => {
                encrypt_aes256_cts_hmac_sha1_96(k, &data, key_usage)
                    .map(|data| EncryptedData::Aes256CtsHmacSha196 { kvno: None, data })
            }
        }
    }

    pub(crate) fn checksum(&self, data: &[u8], key_usage: i32) -> Result<Vec<u8>, KrbError> {
        match self {
            SessionKey::Aes256CtsHmacSha196 { k } => {
                checksum_hmac_sha1_96_aes256(data, k, key_usage)
            }
        }
    }
}

impl TryInto<KdcEncryptionKey> for &SessionKey {
    type Error = KrbError;

    fn try_into(self) -> Result<KdcEncryptionKey, KrbError> {
        match self {
            SessionKey::Aes256CtsHmacSha196 { k } => {
                let key_value = OctetString::new(*k).map_err(|_| KrbError::DerEncodeOctetString)?;

                Ok(KdcEncryptionKey {
                    key_type: EncryptionType::AES256_CTS_HMAC_SHA1_96 as i32,
                    key_value,
                })
            }
        }
    }
}

impl TryFrom<KdcEncryptionKey> for SessionKey {
    type Error = KrbError;

    fn try_from(kdc_enc_key: KdcEncryptionKey) -> Result<SessionKey, KrbError> {
        let etype: EncryptionType = EncryptionType::try_from(kdc_enc_key.key_type)
            .map_err(|_| KrbError::UnsupportedEncryption)?;

        match etype {
            EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
                let mut k = [0; AES_256_KEY_LEN];
                let byte_ref = kdc_enc_key.key_value.as_bytes();

                if byte_ref.len() != k.len() {
                    return Err(KrbError::InvalidEncryptionKey);
                }

                k.copy_from_slice(byte_ref);

                Ok(SessionKey::Aes256CtsHmacSha196 { k })
            }
            _ => Err(KrbError::UnsupportedEncryption),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedData {
    Aes256CtsHmacSha196 {
        kvno: Option<u32>,
        data: Vec<u8>,
    },
    /// Sealed under an encryption type this crate does not implement. The
    /// message codec hands these through undisturbed; any attempt to
    /// unseal one fails closed.
    Opaque {
        etype: i32,
        kvno: Option<u32>,
        data: Vec<u8>,
    },
}

impl EncryptedData {
    pub fn etype(&self) -> i32 {
        match self {
            EncryptedData::Aes256CtsHmacSha196 { .. } => {
                EncryptionType::AES256_CTS_HMAC_SHA1_96 as i32
            }
            EncryptedData::Opaque { etype, .. } => *etype,
        }
    }
}

impl TryFrom<KdcEncryptedData> for EncryptedData {
    type Error = KrbError;

    fn try_from(enc_data: KdcEncryptedData) -> Result<Self, Self::Error> {
        let kvno = enc_data.kvno;
        let data = enc_data.cipher.into_bytes();

        match EncryptionType::try_from(enc_data.etype) {
            Ok(EncryptionType::AES256_CTS_HMAC_SHA1_96) => {
                Ok(EncryptedData::Aes256CtsHmacSha196 {
                    kvno,
                    data: data.to_vec(),
                })
            }
            _ => Ok(EncryptedData::Opaque {
                etype: enc_data.etype,
                kvno,
                data: data.to_vec(),
            }),
        }
    }
}

impl TryInto<KdcEncryptedData> for &EncryptedData {
    type Error = KrbError;

    fn try_into(self) -> Result<KdcEncryptedData, KrbError> {
        let (etype, kvno, data) = match self {
            EncryptedData::Aes256CtsHmacSha196 { kvno, data } => (
                EncryptionType::AES256_CTS_HMAC_SHA1_96 as i32,
                *kvno,
                data,
            ),
            EncryptedData::Opaque { etype, kvno, data } => (*etype, *kvno, data),
        };

        Ok(KdcEncryptedData {
            etype,
            kvno,
            cipher: OctetString::new(data.clone()).map_err(|_| KrbError::DerEncodeOctetString)?,
        })
    }
}

/// A ticket as it travels: the service it names in the clear, and the
/// sealed EncTicketPart the service alone can open. Immutable once
/// issued - this crate only ever reads a presented ticket and constructs
/// a brand new one.
#[derive(Debug, Clone)]
pub struct EncTicket {
    pub(crate) tkt_vno: i8,
    pub(crate) service: Name,
    pub(crate) enc_part: EncryptedData,
}

impl EncTicket {
    pub(crate) fn new(service: Name, enc_part: EncryptedData) -> Self {
        EncTicket {
            tkt_vno: 5,
            service,
            enc_part,
        }
    }

    pub fn service(&self) -> &Name {
        &self.service
    }

    pub fn enc_part(&self) -> &EncryptedData {
        &self.enc_part
    }
}

/// The decrypted view of a presented ticket granting ticket.
#[derive(Debug)]
pub struct Ticket {
    pub(crate) flags: TicketFlags,
    pub(crate) client_name: Name,
    pub(crate) session_key: SessionKey,
    pub(crate) auth_time: SystemTime,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) renew_until: Option<SystemTime>,
    pub(crate) client_addresses: Option<HostAddresses>,
    pub(crate) authorization_data: Option<Vec<AuthorizationData>>,
    pub(crate) transited: TransitedEncoding,
}

impl Ticket {
    pub fn client_name(&self) -> &Name {
        &self.client_name
    }

    pub fn auth_time(&self) -> SystemTime {
        self.auth_time
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn renew_until(&self) -> Option<SystemTime> {
        self.renew_until
    }

    pub fn flags(&self) -> &TicketFlags {
        &self.flags
    }

    pub(crate) fn has_client_addresses(&self) -> bool {
        self.client_addresses
            .as_ref()
            .map(|addrs| !addrs.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd)]
pub enum Name {
    Principal {
        name: String,
        realm: String,
    },
    // Thanks to MIT KRB, it incorrectly sometimes uses name type 1 and 3 for
    // these two. So we have to store them as separate things, but they also need
    // to compare the same :(
    SrvPrincipal {
        service: String,
        host: String,
        realm: String,
    },
    SrvHst {
        service: String,
        host: String,
        realm: String,
    },
    SrvInst {
        service: String,
        instance: Vec<String>,
        realm: String,
    },
}

impl Name {
    pub fn principal(name: &str, realm: &str) -> Self {
        Self::Principal {
            name: name.to_string(),
            realm: realm.to_string(),
        }
    }

    pub fn service(srvname: &str, hostname: &str, realm: &str) -> Self {
        Self::SrvPrincipal {
            service: srvname.to_string(),
            host: hostname.to_string(),
            realm: realm.to_string(),
        }
    }

    /// RFC4120, section 7.3: the principal identifier of the ticket
    /// granting service is a two part name of type NT-SRV-INST, with the
    /// first part "krbtgt" and the second part the realm that will accept
    /// the TGT.
    pub fn service_krbtgt(realm: &str) -> Self {
        Self::SrvInst {
            service: "krbtgt".to_string(),
            instance: vec![realm.to_string()],
            realm: realm.to_string(),
        }
    }

    /// MIT KRB often confuses SrvHst and SrvPrincipal (name types 1 and 3). This
    /// normalises SrvHst to SrvPrincipal to assist with name matching.
    ///
    /// MS Windows uses SrvInst instead of SrvHst in TGS-REQ. This normalises
    /// SrvInst to SrvPrincipal if there is only one instance component.
    pub fn service_hst_normalise(self) -> Self {
        match self {
            Self::SrvHst {
                service,
                host,
                realm,
            } => Self::SrvPrincipal {
                service,
                host,
                realm,
            },
            Self::SrvInst {
                service,
                mut instance,
                realm,
            } => {
                if service != "krbtgt" && instance.len() == 1 {
                    Self::SrvPrincipal {
                        service,
                        host: instance.remove(0),
                        realm,
                    }
                } else {
                    Self::SrvInst {
                        service,
                        instance,
                        realm,
                    }
                }
            }
            ignore => ignore,
        }
    }

    pub fn is_service_krbtgt(&self, check_realm: &str) -> bool {
        match self {
            Self::SrvInst {
                service,
                instance: _,
                realm,
            } => service == "krbtgt" && check_realm == realm,
            Self::SrvPrincipal {
                service,
                host: _,
                realm,
            } => service == "krbtgt" && check_realm == realm,
            Self::Principal { name, realm } => name == "krbtgt" && check_realm == realm,
            _ => false,
        }
    }

    pub fn realm(&self) -> &str {
        match self {
            Name::Principal { realm, .. }
            | Name::SrvPrincipal { realm, .. }
            | Name::SrvInst { realm, .. }
            | Name::SrvHst { realm, .. } => realm.as_str(),
        }
    }

    /// If the name is a PRINCIPAL then return its name and realm components. If
    /// not, then an error is returned.
    pub fn principal_name(&self) -> Result<(&str, &str), KrbError> {
        match self {
            Name::Principal { name, realm } => Ok((name.as_str(), realm.as_str())),
            _ => Err(KrbError::NameNotPrincipal),
        }
    }
}

impl From<&Name> for String {
    fn from(val: &Name) -> Self {
        match val {
            Name::Principal { name, realm } => {
                format!("{name}@{realm}")
            }
            Name::SrvPrincipal {
                service,
                host,
                realm,
            } => {
                format!("{service}/{host}@{realm}")
            }
            Name::SrvInst {
                service,
                instance,
                realm,
            } => {
                format!("{service}/{}@{realm}", instance.join("/"))
            }
            Name::SrvHst {
                service,
                host,
                realm,
            } => {
                format!("{service}/{host}@{realm}")
            }
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from(self))
    }
}

impl TryFrom<(&PrincipalName, &Realm)> for Name {
    type Error = KrbError;

    fn try_from((princ, realm): (&PrincipalName, &Realm)) -> Result<Self, Self::Error> {
        let realm = realm.as_str().to_string();

        let name_type = PrincipalNameType::try_from(princ.name_type)
            .unwrap_or(PrincipalNameType::NtPrincipal);

        let components: Vec<String> = princ
            .name_string
            .iter()
            .map(|ks| ks.as_str().to_string())
            .collect();

        match (name_type, components.as_slice()) {
            (PrincipalNameType::NtPrincipal | PrincipalNameType::NtUnknown, [name]) => {
                Ok(Name::Principal {
                    name: name.clone(),
                    realm,
                })
            }
            (PrincipalNameType::NtPrincipal | PrincipalNameType::NtUnknown, [service, host]) => {
                Ok(Name::SrvPrincipal {
                    service: service.clone(),
                    host: host.clone(),
                    realm,
                })
            }
            (PrincipalNameType::NtSrvHst, [service, host]) => Ok(Name::SrvHst {
                service: service.clone(),
                host: host.clone(),
                realm,
            }),
            (PrincipalNameType::NtSrvInst, [service, instance @ ..]) if !instance.is_empty() => {
                Ok(Name::SrvInst {
                    service: service.clone(),
                    instance: instance.to_vec(),
                    realm,
                })
            }
            _ => {
                trace!(?princ, "invalid number of name components");
                Err(KrbError::NameNumberOfComponents)
            }
        }
    }
}

impl TryInto<Realm> for &Name {
    type Error = KrbError;

    fn try_into(self) -> Result<Realm, KrbError> {
        Ia5String::new(self.realm())
            .map(KerberosString)
            .map_err(|_| KrbError::DerEncodeKerberosString)
    }
}

impl TryInto<PrincipalName> for &Name {
    type Error = KrbError;

    fn try_into(self) -> Result<PrincipalName, KrbError> {
        let to_ks = |value: &str| {
            Ia5String::new(value)
                .map(KerberosString)
                .map_err(|_| KrbError::DerEncodeKerberosString)
        };

        match self {
            Name::Principal { name, realm: _ } => Ok(PrincipalName {
                name_type: PrincipalNameType::NtPrincipal as i32,
                name_string: vec![to_ks(name)?],
            }),
            Name::SrvPrincipal {
                service,
                host,
                realm: _,
            } => Ok(PrincipalName {
                name_type: PrincipalNameType::NtPrincipal as i32,
                name_string: vec![to_ks(service)?, to_ks(host)?],
            }),
            Name::SrvHst {
                service,
                host,
                realm: _,
            } => Ok(PrincipalName {
                name_type: PrincipalNameType::NtSrvHst as i32,
                name_string: vec![to_ks(service)?, to_ks(host)?],
            }),
            Name::SrvInst {
                service,
                instance,
                realm: _,
            } => {
                let mut name_string = Vec::with_capacity(instance.len() + 1);
                name_string.push(to_ks(service)?);
                for item in instance.iter() {
                    name_string.push(to_ks(item)?);
                }

                Ok(PrincipalName {
                    name_type: PrincipalNameType::NtSrvInst as i32,
                    name_string,
                })
            }
        }
    }
}
