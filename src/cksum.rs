use crate::asn1::checksum::Checksum as Asn1Checksum;
use crate::asn1::OctetString;
use crate::constants::{CKSUMTYPE_HMAC_SHA1_96_AES256, KEY_USAGE_TGS_REQ_AUTH_CKSUM};
use crate::error::KrbError;
use crate::proto::SessionKey;

/// Computes and verifies the checksum an authenticator carries over the
/// raw KDC-REQ-BODY bytes. The checksum MUST be computed over exactly the
/// bytes that were transmitted, never over a re-serialisation.
pub(crate) enum ChecksumBuilder {
    HmacSha196Aes256(SessionKey),
}

impl ChecksumBuilder {
    fn value(&self) -> i32 {
        match self {
            Self::HmacSha196Aes256(_) => CKSUMTYPE_HMAC_SHA1_96_AES256,
        }
    }

    pub(crate) fn compute_kdc_req_body(&self, req_body: &[u8]) -> Result<Asn1Checksum, KrbError> {
        if req_body.is_empty() {
            return Err(KrbError::TgsInappropriateChecksum);
        }

        let checksum = match self {
            Self::HmacSha196Aes256(k) => {
                let checksum = k.checksum(req_body, KEY_USAGE_TGS_REQ_AUTH_CKSUM)?;
                OctetString::new(checksum.as_slice())
            }
        }
        .map_err(|_| KrbError::DerEncodeOctetString)?;

        Ok(Asn1Checksum {
            checksum_type: self.value(),
            checksum,
        })
    }
}

impl TryFrom<(i32, &SessionKey)> for ChecksumBuilder {
    type Error = KrbError;

    fn try_from((value, k): (i32, &SessionKey)) -> Result<Self, Self::Error> {
        match value {
            CKSUMTYPE_HMAC_SHA1_96_AES256 => Ok(ChecksumBuilder::HmacSha196Aes256(k.clone())),
            // The unkeyed legacy sum types can not prove anything about
            // the sender, so they are not accepted here at all.
            _ => Err(KrbError::TgsChecksumTypeUnsupported),
        }
    }
}

impl From<&SessionKey> for ChecksumBuilder {
    fn from(key: &SessionKey) -> Self {
        match key {
            SessionKey::Aes256CtsHmacSha196 { .. } => {
                ChecksumBuilder::HmacSha196Aes256(key.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::constants::EncryptionType;

    #[test]
    fn checksum_detects_any_flip() {
        let key = SessionKey::generate(EncryptionType::AES256_CTS_HMAC_SHA1_96).unwrap();
        let builder = ChecksumBuilder::from(&key);

        let body = b"a kdc-req-body as it crossed the wire".to_vec();
        let sum = builder.compute_kdc_req_body(&body).unwrap();

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            let other = builder.compute_kdc_req_body(&tampered).unwrap();
            assert_ne!(sum, other);
        }
    }

    #[test]
    fn checksum_unknown_type_rejected() {
        let key = SessionKey::generate(EncryptionType::AES256_CTS_HMAC_SHA1_96).unwrap();
        // rsa-md5 and friends are declared but not computable here.
        assert!(matches!(
            ChecksumBuilder::try_from((7, &key)),
            Err(KrbError::TgsChecksumTypeUnsupported)
        ));
    }
}
