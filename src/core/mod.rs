//! # Core Protocol Components
//!
//! Low-level packet handling and binary wire format.
//!
//! ## Wire Format
//! ```text
//! [Magic(2)] [Length(2)] [Flag(4)] [DeviceId(4)] [Timestamp(4)] [Checksum(16)] [Payload(N)]
//! ```
//!
//! All integer fields are big-endian. A frame whose total length equals the
//! 32-byte header is a handshake; everything else carries an encrypted
//! payload starting at offset 32.

pub mod packet;

pub use packet::Packet;
