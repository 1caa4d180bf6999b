use super::encryption_key::EncryptionKey;
use super::host_address::HostAddresses;
use super::kerberos_string::Realm;
use super::kerberos_time::KerberosTime;
use super::last_req::LastReqItem;
use super::principal_name::PrincipalName;
use super::ticket_flags::TicketFlags;
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

/// ```text
/// EncKDCRepPart   ::= SEQUENCE {
///         key             [0] EncryptionKey,
///         last-req        [1] LastReq,
///         nonce           [2] UInt32,
///         key-expiration  [3] KerberosTime OPTIONAL,
///         flags           [4] TicketFlags,
///         authtime        [5] KerberosTime,
///         starttime       [6] KerberosTime OPTIONAL,
///         endtime         [7] KerberosTime,
///         renew-till      [8] KerberosTime OPTIONAL,
///         srealm          [9] Realm,
///         sname           [10] PrincipalName,
///         caddr           [11] HostAddresses OPTIONAL
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct EncKdcRepPart {
    #[asn1(context_specific = "0")]
    pub key: EncryptionKey,
    #[asn1(context_specific = "1")]
    pub last_req: Vec<LastReqItem>,
    #[asn1(context_specific = "2")]
    pub nonce: i32,
    #[asn1(context_specific = "3", optional = "true")]
    pub key_expiration: Option<KerberosTime>,
    #[asn1(context_specific = "4")]
    pub flags: TicketFlags,
    #[asn1(context_specific = "5")]
    pub auth_time: KerberosTime,
    #[asn1(context_specific = "6", optional = "true")]
    pub start_time: Option<KerberosTime>,
    #[asn1(context_specific = "7")]
    pub end_time: KerberosTime,
    #[asn1(context_specific = "8", optional = "true")]
    pub renew_till: Option<KerberosTime>,
    #[asn1(context_specific = "9")]
    pub server_realm: Realm,
    #[asn1(context_specific = "10")]
    pub server_name: PrincipalName,
    #[asn1(context_specific = "11", optional = "true")]
    pub client_addresses: Option<HostAddresses>,
}

/// ```text
/// EncTGSRepPart   ::= [APPLICATION 26] EncKDCRepPart
/// ````
#[derive(Debug, Eq, PartialEq)]
pub(crate) struct TaggedEncTgsRepPart(pub EncKdcRepPart);

impl FixedTag for TaggedEncTgsRepPart {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(26),
    };
}

impl<'a> DecodeValue<'a> for TaggedEncTgsRepPart {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        let t: EncKdcRepPart = EncKdcRepPart::decode(reader)?;
        Ok(Self(t))
    }
}

impl EncodeValue for TaggedEncTgsRepPart {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }
    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)?;
        Ok(())
    }
}

impl From<TaggedEncTgsRepPart> for EncKdcRepPart {
    fn from(value: TaggedEncTgsRepPart) -> Self {
        value.0
    }
}
