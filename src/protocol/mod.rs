//! # Session Protocol
//!
//! Cryptographic session layer on top of the packet codec.
//!
//! ## Components
//! - **Message**: JSON request/response bodies exchanged with the device
//! - **Session**: per-device key/IV derivation, request packing, response
//!   unpacking, and the checksum-via-token-substitution scheme
//!
//! ## Security
//! The token is a 16-byte shared secret provisioned out of band. It is used
//! both to derive the AES key/IV (`key = md5(token)`,
//! `iv = md5(key ++ token)`) and as the substitution value when computing
//! frame checksums.

pub mod message;
pub mod session;

pub use message::{Request, Response, ResponseError};
pub use session::Protocol;
