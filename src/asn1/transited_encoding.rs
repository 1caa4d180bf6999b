use der::asn1::OctetString;
use der::Sequence;

/// ```text
/// TransitedEncoding       ::= SEQUENCE {
///        tr-type         [0] Int32 -- must be registered --,
///        contents        [1] OCTET STRING
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct TransitedEncoding {
    #[asn1(context_specific = "0")]
    pub(crate) tr_type: i32,
    #[asn1(context_specific = "1")]
    pub(crate) contents: OctetString,
}

impl TransitedEncoding {
    /// The DOMAIN-X500-COMPRESS encoding of "no realms transited". Issuing
    /// within a single realm never appends to this; cross realm transit
    /// compression is not performed, the content is carried opaque.
    pub(crate) fn empty() -> der::Result<Self> {
        Ok(TransitedEncoding {
            tr_type: 1,
            contents: OctetString::new(*b"")?,
        })
    }
}
