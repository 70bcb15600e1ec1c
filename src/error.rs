//! # Error Types
//!
//! Error handling for the miIO protocol client.
//!
//! This module defines all error variants that can occur during protocol
//! operations, from low-level I/O failures to device-level rejections.
//!
//! ## Error Categories
//! - **Malformed frames**: bad magic, length mismatch, bad flag, checksum
//!   mismatch, undecryptable or unparsable payload
//! - **Transport errors**: send failures, timeouts, closed endpoints
//! - **Device errors**: the device answered but declined the request
//!
//! Malformed-frame and transport errors count against the retry budget of a
//! call; device errors surface to the caller directly, since resending an
//! already-answered request will not change the device's verdict.
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Transport errors
    pub const ERR_TIMEOUT: &str = "No matching response within timeout";
    pub const ERR_ENDPOINT_CLOSED: &str = "Transport endpoint closed";

    /// Synchronization errors
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";

    /// Device session errors
    pub const ERR_EMPTY_RESPONSE: &str = "Empty response";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid magic: {0:#06x}")]
    InvalidMagic(u16),

    #[error("Invalid packet size, expected {expected} got {actual}")]
    InvalidPacketSize { expected: usize, actual: usize },

    #[error("Invalid flag: {0:#010x}")]
    InvalidFlag(u32),

    #[error("Packet too short: {0} bytes")]
    TruncatedPacket(usize),

    #[error("Invalid packet checksum")]
    ChecksumMismatch,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Malformed response payload: {0}")]
    MalformedResponse(String),

    #[error("Failed to serialize request: {0}")]
    SerializeError(String),

    #[error("Invalid device token: {0}")]
    InvalidToken(String),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("No matching response within timeout")]
    Timeout,

    #[error("Transport endpoint closed")]
    EndpointClosed,

    #[error("Device responded with error: \"{message}\". Code: {code}")]
    DeviceError { code: i32, message: String },

    #[error("Empty response")]
    EmptyResponse,

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Clones the error for fan-out to every waiter of a shared operation.
    ///
    /// `io::Error` is not `Clone`, so it degrades to its message; every
    /// other variant is reproduced exactly, keeping the taxonomy intact for
    /// callers that match on the error kind.
    pub fn duplicate(&self) -> Self {
        use ProtocolError::*;
        match self {
            Io(err) => Custom(format!("I/O error: {err}")),
            InvalidMagic(magic) => InvalidMagic(*magic),
            InvalidPacketSize { expected, actual } => InvalidPacketSize {
                expected: *expected,
                actual: *actual,
            },
            InvalidFlag(flag) => InvalidFlag(*flag),
            TruncatedPacket(len) => TruncatedPacket(*len),
            ChecksumMismatch => ChecksumMismatch,
            DecryptionFailure => DecryptionFailure,
            MalformedResponse(msg) => MalformedResponse(msg.clone()),
            SerializeError(msg) => SerializeError(msg.clone()),
            InvalidToken(msg) => InvalidToken(msg.clone()),
            HandshakeError(msg) => HandshakeError(msg.clone()),
            Timeout => Timeout,
            EndpointClosed => EndpointClosed,
            DeviceError { code, message } => DeviceError {
                code: *code,
                message: message.clone(),
            },
            EmptyResponse => EmptyResponse,
            Custom(msg) => Custom(msg.clone()),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
