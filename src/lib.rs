//! The ticket granting service (TGS) core of a Kerberos KDC, as described
//! by RFC 4120. This crate accepts an already-decoded TGS-REQ (a ticket
//! granting ticket plus a request for a service ticket), validates the
//! presented credentials against policy, and issues a new service ticket
//! bound to a fresh session key - or a typed KRB-ERROR when any stage of
//! that pipeline refuses the request.
//!
//! Wire framing of the outer messages is the job of a message codec that
//! sits in front of this crate. The only raw bytes the core ever touches
//! are the retained request-body bytes, which are checksummed exactly as
//! they were transmitted.

#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::disallowed_types)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

mod asn1;
pub(crate) mod cksum;
pub mod config;
pub(crate) mod constants;
pub(crate) mod crypto;
pub mod error;
pub mod kdc;
pub mod proto;
pub mod store;
