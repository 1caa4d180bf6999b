use crate::asn1::constants::errors::KrbErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrbError {
    // =========================================================================================
    // IMPORTANT: Don't add variables to variants in this enum - it's a potential security risk
    // as you can leak internal state in an error as these can end up in userfacing contexts!!!
    //
    // In other words, any extra information you add here is a potential CVE.
    //
    // If you want to debug the error, then use the error! macro at the error raise site to
    // report relevant information.
    //
    // Lastly, the whole reason we have so many error variants is so that just from the error
    // variant alone, we already have a large amount of anonymised detail about the potential
    // cause of the error.
    // =========================================================================================
    InvalidHmacSha1Key,
    MessageAuthenticationFailed,
    MessageEmpty,
    InsufficientData,
    PlaintextEmpty,
    CtsCiphertextInvalid,
    InsecurePassphrase,
    UnsupportedEncryption,
    InvalidEncryptionKey,

    DerDecodeAuthenticator,
    DerEncodeAuthenticator,
    DerDecodeEncTicketPart,
    DerEncodeEncTicketPart,
    DerDecodeEncKdcRepPart,
    DerEncodeEncKdcRepPart,
    DerDecodeAuthorizationData,
    DerEncodeOctetString,
    DerEncodeKerberosString,
    DerEncodeKerberosTime,
    DerEncodeKdcReqBody,

    NameNotPrincipal,
    NameNotServiceHost,
    NameNumberOfComponents,

    NoMatchingEncryptionType,

    TgsMissingPaApReq,
    TgsInvalidPaApReq,
    TgsNotForRealm,
    TgsTicketIsNotTgt,
    TgsMissingServiceName,
    TgsMissingStartTime,

    TgsAuthenticatorBadmatch,
    TgsAuthenticatorClockSkew,
    TgsAuthenticatorReplay,
    TgsAuthMissingChecksum,
    TgsAuthChecksumFailure,
    TgsChecksumTypeUnsupported,
    TgsInappropriateChecksum,

    TgsTicketExpired,
    TgsTicketNotYetValid,
    TgsTicketPendingValidation,

    TgsOptionNotPermitted,
    TgsOptionReserved,
    TgsUserToUserUnsupported,
    TgsPolicyDenied,
    TgsRenewalNotAllowed,
    TgsRenewalExpired,
    TgsCannotPostdate,
    TgsNeverValid,

    ServicePrincipalNotFound,
    TgsServiceNoKey,

    /// No really, do you have a time machine? How did you go back to before 1970?
    DoYouHaveATimeMachine,
}

impl KrbError {
    /// The RFC4120 numeric error condition this variant surfaces on the wire.
    pub fn error_code(&self) -> KrbErrorCode {
        match self {
            KrbError::InvalidHmacSha1Key
            | KrbError::MessageEmpty
            | KrbError::InsufficientData
            | KrbError::PlaintextEmpty
            | KrbError::CtsCiphertextInvalid
            | KrbError::InsecurePassphrase
            | KrbError::DerEncodeAuthenticator
            | KrbError::DerEncodeEncTicketPart
            | KrbError::DerEncodeEncKdcRepPart
            | KrbError::DerEncodeOctetString
            | KrbError::DerEncodeKerberosString
            | KrbError::DerEncodeKerberosTime
            | KrbError::DerEncodeKdcReqBody
            | KrbError::NameNotPrincipal
            | KrbError::NameNotServiceHost
            | KrbError::NameNumberOfComponents
            | KrbError::DoYouHaveATimeMachine => KrbErrorCode::KrbErrGeneric,

            KrbError::MessageAuthenticationFailed
            | KrbError::DerDecodeAuthenticator
            | KrbError::DerDecodeEncTicketPart
            | KrbError::DerDecodeEncKdcRepPart
            | KrbError::DerDecodeAuthorizationData => KrbErrorCode::KrbApErrBadIntegrity,

            KrbError::UnsupportedEncryption
            | KrbError::InvalidEncryptionKey
            | KrbError::NoMatchingEncryptionType => KrbErrorCode::KdcErrEtypeNosupp,

            KrbError::TgsMissingPaApReq | KrbError::TgsInvalidPaApReq => {
                KrbErrorCode::KdcErrPadataTypeNosupp
            }

            KrbError::TgsNotForRealm | KrbError::TgsTicketIsNotTgt => KrbErrorCode::KrbApErrNotUs,

            KrbError::TgsMissingServiceName | KrbError::TgsMissingStartTime => {
                KrbErrorCode::KrbErrGeneric
            }

            KrbError::TgsAuthenticatorBadmatch => KrbErrorCode::KrbApErrBadmatch,
            KrbError::TgsAuthenticatorClockSkew => KrbErrorCode::KrbApErrSkew,
            KrbError::TgsAuthenticatorReplay => KrbErrorCode::KrbApErrRepeat,

            KrbError::TgsAuthMissingChecksum | KrbError::TgsInappropriateChecksum => {
                KrbErrorCode::KrbApErrInappCksum
            }
            KrbError::TgsAuthChecksumFailure => KrbErrorCode::KrbApErrModified,
            KrbError::TgsChecksumTypeUnsupported => KrbErrorCode::KdcErrSumtypeNosupp,

            KrbError::TgsTicketExpired | KrbError::TgsRenewalExpired => {
                KrbErrorCode::KrbApErrTktExpired
            }
            KrbError::TgsTicketNotYetValid | KrbError::TgsTicketPendingValidation => {
                KrbErrorCode::KrbApErrTktNyv
            }

            KrbError::TgsOptionNotPermitted
            | KrbError::TgsOptionReserved
            | KrbError::TgsUserToUserUnsupported => KrbErrorCode::KdcErrBadoption,
            KrbError::TgsPolicyDenied | KrbError::TgsRenewalNotAllowed => KrbErrorCode::KdcErrPolicy,
            KrbError::TgsCannotPostdate => KrbErrorCode::KdcErrCannotPostdate,
            KrbError::TgsNeverValid => KrbErrorCode::KdcErrNeverValid,

            KrbError::ServicePrincipalNotFound => KrbErrorCode::KdcErrSPrincipalUnknown,
            KrbError::TgsServiceNoKey => KrbErrorCode::KrbApErrNokey,
        }
    }

    /// Fixed explanatory text placed into the KRB-ERROR e-text field. These
    /// strings are static on purpose - nothing request-derived may appear here.
    pub fn error_text(&self) -> &'static str {
        match self.error_code() {
            KrbErrorCode::KrbErrGeneric => "Internal Server Error",
            KrbErrorCode::KrbApErrBadIntegrity => {
                "The Kerberos Client sent a request that was cryptographically invalid."
            }
            KrbErrorCode::KdcErrEtypeNosupp => {
                "Client and Server do not have overlapping encryption type support."
            }
            KrbErrorCode::KdcErrPadataTypeNosupp => {
                "Ticket Request did not carry a valid PA-TGS-REQ AP-REQ."
            }
            KrbErrorCode::KrbApErrNotUs => "Ticket was issued for a different KDC.",
            KrbErrorCode::KrbApErrBadmatch => "Authenticator does not match the ticket.",
            KrbErrorCode::KrbApErrSkew => "Clock Skew too great",
            KrbErrorCode::KrbApErrRepeat => "Authenticator was replayed.",
            KrbErrorCode::KrbApErrInappCksum => "Inappropriate type of checksum in message",
            KrbErrorCode::KrbApErrModified => "Request body was modified in flight.",
            KrbErrorCode::KdcErrSumtypeNosupp => "KDC has no support for checksum type",
            KrbErrorCode::KrbApErrTktExpired => "Ticket has expired.",
            KrbErrorCode::KrbApErrTktNyv => "Ticket is not yet valid.",
            KrbErrorCode::KdcErrBadoption => "KDC cannot accommodate requested option",
            KrbErrorCode::KdcErrPolicy => "Requested option is denied by policy",
            KrbErrorCode::KdcErrCannotPostdate => "Ticket not eligible for postdating",
            KrbErrorCode::KdcErrNeverValid => {
                "Requested ticket would never be valid within its window"
            }
            KrbErrorCode::KdcErrSPrincipalUnknown => {
                "Ticket Request Failed - Service Name not found."
            }
            KrbErrorCode::KrbApErrNokey => "No Key Available",
            _ => "Internal Server Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_mapping_is_rfc_numbered() {
        assert_eq!(
            KrbError::TgsOptionNotPermitted.error_code() as i32,
            KrbErrorCode::KdcErrBadoption as i32
        );
        assert_eq!(KrbError::TgsPolicyDenied.error_code() as i32, 12);
        assert_eq!(KrbError::TgsNeverValid.error_code() as i32, 11);
        assert_eq!(KrbError::TgsCannotPostdate.error_code() as i32, 10);
        assert_eq!(KrbError::TgsTicketExpired.error_code() as i32, 32);
        assert_eq!(KrbError::TgsTicketNotYetValid.error_code() as i32, 33);
        assert_eq!(KrbError::TgsAuthenticatorReplay.error_code() as i32, 34);
        assert_eq!(KrbError::TgsNotForRealm.error_code() as i32, 35);
        assert_eq!(KrbError::TgsAuthChecksumFailure.error_code() as i32, 41);
        assert_eq!(KrbError::ServicePrincipalNotFound.error_code() as i32, 7);
        assert_eq!(KrbError::NoMatchingEncryptionType.error_code() as i32, 14);
    }
}
