//! DER forms of the encrypted payloads this crate seals and unseals. The
//! outer message grammar (KDC-REQ, AP-REQ, TGS-REP, KRB-ERROR) belongs to
//! the message codec in front of this crate and is not defined here.

pub mod authenticator;
pub mod authorization_data;
pub mod checksum;
pub mod constants;
pub mod enc_kdc_rep_part;
pub mod enc_ticket_part;
pub mod encrypted_data;
pub mod encryption_key;
pub mod host_address;
pub mod kdc_req_body;
pub mod kerberos_string;
pub mod kerberos_time;
pub mod last_req;
pub mod principal_name;
pub mod ticket_flags;
pub mod transited_encoding;

pub use der::asn1::{Ia5String, OctetString};
