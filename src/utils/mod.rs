//! # Utility Modules
//!
//! Supporting utilities shared across the protocol implementation.
//!
//! ## Components
//! - **Crypto**: MD5 digests and AES-128-CBC encryption, the primitives the
//!   miIO wire format is built on
//! - **Retry**: bounded-attempt async retry with a fixed delay

pub mod crypto;
pub mod retry;

pub use retry::retry;
