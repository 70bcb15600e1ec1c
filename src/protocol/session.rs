//! Per-device session protocol: key derivation, checksums, and the
//! encrypted request/response framing.
//!
//! The checksum scheme is the protocol's one non-obvious trick: the frame is
//! serialized with the raw 16-byte token sitting in the checksum field, and
//! the MD5 of that whole buffer becomes the checksum actually sent. Hashing
//! the payload alone, or the frame with a zeroed checksum field, will not
//! interoperate with real devices.

use tracing::debug;

use crate::config::{CHECKSUM_SIZE, HANDSHAKE_FLAG, HEADER_SIZE, TOKEN_SIZE};
use crate::core::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{Request, Response};
use crate::utils::crypto;

/// Parses a device token from its 32-character hex representation.
pub fn parse_token(token: &str) -> Result<[u8; TOKEN_SIZE]> {
    let bytes = hex::decode(token)
        .map_err(|err| ProtocolError::InvalidToken(err.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| ProtocolError::InvalidToken(format!("expected {TOKEN_SIZE} bytes")))
}

/// Cryptographic state of one device session.
///
/// The key and IV are derived once from the token and stay immutable for the
/// session's lifetime: `key = md5(token)`, `iv = md5(key ++ token)`.
pub struct Protocol {
    device_id: u32,
    token: [u8; TOKEN_SIZE],
    key: [u8; TOKEN_SIZE],
    iv: [u8; TOKEN_SIZE],
}

impl Protocol {
    /// Creates the session protocol for a device.
    pub fn new(device_id: u32, token: [u8; TOKEN_SIZE]) -> Self {
        let key = crypto::digest(&token);
        let mut key_and_token = [0u8; TOKEN_SIZE * 2];
        key_and_token[..TOKEN_SIZE].copy_from_slice(&key);
        key_and_token[TOKEN_SIZE..].copy_from_slice(&token);
        let iv = crypto::digest(&key_and_token);

        Self {
            device_id,
            token,
            key,
            iv,
        }
    }

    /// The canonical outbound handshake packet: header-only, every field at
    /// its sentinel value.
    pub fn handshake_packet() -> Packet {
        Packet {
            flag: HANDSHAKE_FLAG,
            device_id: 0xffff_ffff,
            timestamp: 0xffff_ffff,
            checksum: [0xff; CHECKSUM_SIZE],
            payload: Vec::new(),
        }
    }

    /// A received frame is a handshake iff it is exactly one header long.
    /// The flag is advisory; the length is the load-bearing discriminator.
    pub fn is_handshake(packet: &Packet) -> bool {
        packet.len() == HEADER_SIZE
    }

    /// Encrypts a request and wraps it into a checksummed packet.
    ///
    /// The body is serialized as UTF-8 JSON with a trailing NUL byte before
    /// encryption, matching device firmware expectations.
    ///
    /// # Errors
    /// Returns `ProtocolError::SerializeError` if the request body cannot be
    /// serialized.
    pub fn pack_request(&self, request: &Request, timestamp: u32) -> Result<Packet> {
        let mut body = serde_json::to_vec(request)
            .map_err(|err| ProtocolError::SerializeError(err.to_string()))?;
        body.push(0);

        let payload = crypto::encrypt(&self.key, &self.iv, &body);
        let checksum = self.checksum(self.device_id, timestamp, &payload);

        Ok(Packet {
            flag: 0,
            device_id: self.device_id,
            timestamp,
            checksum,
            payload,
        })
    }

    /// Validates, decrypts and parses a response packet.
    ///
    /// Checksum validation happens first; decryption is never attempted on a
    /// frame that fails it.
    ///
    /// # Errors
    /// `ProtocolError::ChecksumMismatch` on a bad checksum,
    /// `ProtocolError::DecryptionFailure` or
    /// `ProtocolError::MalformedResponse` on an undecryptable or unparsable
    /// payload.
    pub fn unpack_response(&self, packet: &Packet) -> Result<Response> {
        if !self.validate_checksum(packet) {
            return Err(ProtocolError::ChecksumMismatch);
        }

        let plaintext = crypto::decrypt(&self.key, &self.iv, &packet.payload)?;

        // Devices pad the JSON body with trailing NULs
        let body = match plaintext.iter().rposition(|&b| b != 0) {
            Some(last) => &plaintext[..=last],
            None => &plaintext[..],
        };

        let response: Response = serde_json::from_slice(body)
            .map_err(|err| ProtocolError::MalformedResponse(err.to_string()))?;

        debug!(id = response.id(), "Unpacked device response");
        Ok(response)
    }

    /// Computes a frame checksum by substituting the raw token into the
    /// checksum field and digesting the whole serialized frame.
    ///
    /// Public so that device simulators can produce valid replies.
    pub fn checksum(&self, device_id: u32, timestamp: u32, payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
        let dummy = Packet {
            flag: 0,
            device_id,
            timestamp,
            checksum: self.token,
            payload: payload.to_vec(),
        };
        crypto::digest(&dummy.to_bytes())
    }

    /// Recomputes the checksum of a received packet and compares it to the
    /// one the packet carries.
    fn validate_checksum(&self, packet: &Packet) -> bool {
        let expected = self.checksum(packet.device_id, packet.timestamp, &packet.payload);
        expected == packet.checksum
    }
}
