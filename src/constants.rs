pub(crate) const AES_BLOCK_SIZE: usize = 16;
pub(crate) const AES_256_KEY_LEN: usize = 32;
pub(crate) const SHA1_HMAC_LEN: usize = 12;

pub(crate) const IV_ZERO: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// The RFC3962 default of 0x1000 (4096) rounds. Far too few, but needed
/// to interpret keys derived by other implementations.
pub(crate) const RFC_PBKDF2_SHA1_ITER: u32 = 4096;

/// The rounds this KDC derives its own keys with.
pub(crate) const PBKDF2_SHA1_ITER: u32 = 0x8000;

// RFC 4120 section 7.5.1 - the key usage numbers that keep the seals of
// the different message parts cryptographically separate even when they
// share a key. Interchanging any two of these is a protocol break.

/// Ticket enc-part, sealed under the target service's long term key.
pub(crate) const KEY_USAGE_TICKET: i32 = 2;
/// TGS-REQ KDC-REQ-BODY authorization data, sealed under the TGT session key.
pub(crate) const KEY_USAGE_TGS_REQ_AUTHZ_SESSION: i32 = 4;
/// TGS-REQ KDC-REQ-BODY authorization data, sealed under the authenticator subkey.
pub(crate) const KEY_USAGE_TGS_REQ_AUTHZ_SUBKEY: i32 = 5;
/// PA-TGS-REQ authenticator checksum, keyed with the TGT session key.
pub(crate) const KEY_USAGE_TGS_REQ_AUTH_CKSUM: i32 = 6;
/// PA-TGS-REQ authenticator, sealed under the TGT session key.
pub(crate) const KEY_USAGE_TGS_REQ_AUTHENTICATOR: i32 = 7;
/// TGS-REP enc-part when sealed under the TGT session key.
pub(crate) const KEY_USAGE_TGS_REP_SESSION: i32 = 8;
/// TGS-REP enc-part when sealed under the authenticator subkey.
pub(crate) const KEY_USAGE_TGS_REP_SUBKEY: i32 = 9;

/// The mandatory keyed checksum type for aes256-cts-hmac-sha1-96.
pub(crate) const CKSUMTYPE_HMAC_SHA1_96_AES256: i32 = 16;
