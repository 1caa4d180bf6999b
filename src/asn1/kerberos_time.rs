use der::asn1::GeneralizedTime;
use der::{DecodeValue, EncodeValue, FixedTag, Tag};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// ```text
/// KerberosTime    ::= GeneralizedTime -- with no fractional seconds
/// ````
// All protocol time comparisons happen at second granularity - the
// fractional part is stripped before a SystemTime ever becomes one of
// these.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct KerberosTime(GeneralizedTime);

impl KerberosTime {
    pub fn from_unix_duration(duration: Duration) -> der::Result<Self> {
        GeneralizedTime::from_unix_duration(Duration::from_secs(duration.as_secs()))
            .map(KerberosTime)
    }

    pub fn from_system_time(t: SystemTime) -> der::Result<Self> {
        let duration = t
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from_unix_duration(duration)
    }

    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + self.0.to_unix_duration()
    }
}

impl FixedTag for KerberosTime {
    const TAG: Tag = Tag::GeneralizedTime;
}

impl<'a> DecodeValue<'a> for KerberosTime {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, header: der::Header) -> der::Result<Self> {
        GeneralizedTime::decode_value(reader, header).map(KerberosTime)
    }
}

impl EncodeValue for KerberosTime {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.value_len()
    }
    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode_value(encoder)
    }
}
