//! miIO wire packet: the fixed 32-byte header plus an opaque payload.
//!
//! The codec is strict: any violation of the structural invariants (magic,
//! exact length match, flag domain) is a malformed-frame error, never a
//! lenient partial parse. Payload size is not limited here; datagram limits
//! are the transport's concern.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::{CHECKSUM_SIZE, HANDSHAKE_FLAG, HEADER_SIZE, MAGIC};
use crate::error::{ProtocolError, Result};

/// A single miIO protocol frame.
///
/// `magic` and `length` are not stored: the magic is constant and the length
/// is derived from the payload on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 0 for normal packets, `0xffffffff` for handshake packets
    pub flag: u32,
    /// Device identifier (`0xffffffff` in outbound handshakes)
    pub device_id: u32,
    /// Device session clock, echoed back on the next request
    pub timestamp: u32,
    /// MD5 digest over the whole frame with the token substituted in
    pub checksum: [u8; CHECKSUM_SIZE],
    /// Encrypted request/response body; empty for handshakes
    pub payload: Vec<u8>,
}

impl Packet {
    /// Total frame length in bytes
    pub fn len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// True when the frame carries no payload, i.e. is exactly one header
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Parses a binary frame.
    ///
    /// # Errors
    /// Returns a malformed-frame error on a short buffer, wrong magic, a
    /// length field that disagrees with the actual buffer length, or a flag
    /// outside {0, `0xffffffff`}.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedPacket(buf.len()));
        }

        let mut header = &buf[..HEADER_SIZE];

        let magic = header.get_u16();
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let length = header.get_u16() as usize;
        if length != buf.len() {
            return Err(ProtocolError::InvalidPacketSize {
                expected: length,
                actual: buf.len(),
            });
        }

        let flag = header.get_u32();
        if flag != 0 && flag != HANDSHAKE_FLAG {
            return Err(ProtocolError::InvalidFlag(flag));
        }

        let device_id = header.get_u32();
        let timestamp = header.get_u32();

        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&buf[HEADER_SIZE - CHECKSUM_SIZE..HEADER_SIZE]);

        Ok(Self {
            flag,
            device_id,
            timestamp,
            checksum,
            payload: buf[HEADER_SIZE..].to_vec(),
        })
    }

    /// Serializes the frame; the length field is computed, never caller-supplied.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_u16(MAGIC);
        buf.put_u16(self.len() as u16);
        buf.put_u32(self.flag);
        buf.put_u32(self.device_id);
        buf.put_u32(self.timestamp);
        buf.put_slice(&self.checksum);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Packet {
        Packet {
            flag: 0,
            device_id: 0x0004_3abc,
            timestamp: 1234,
            checksum: [0xab; CHECKSUM_SIZE],
            payload: vec![1, 2, 3, 4, 5],
        }
    }

    #[test]
    fn round_trip() {
        let packet = sample();
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn round_trip_empty_payload() {
        let packet = Packet {
            flag: HANDSHAKE_FLAG,
            device_id: 0xffff_ffff,
            timestamp: 0xffff_ffff,
            checksum: [0xff; CHECKSUM_SIZE],
            payload: Vec::new(),
        };
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes[0] = 0x55;
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::InvalidMagic(_))
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut bytes = sample().to_bytes().to_vec();
        // Truncate the payload without fixing the length field
        bytes.pop();
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::InvalidPacketSize { .. })
        ));
    }

    #[test]
    fn rejects_bad_flag() {
        let mut packet = sample();
        packet.flag = 0xdead_beef;
        let bytes = packet.to_bytes();
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(ProtocolError::InvalidFlag(0xdead_beef))
        ));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(
            Packet::from_bytes(&[0x21, 0x31, 0x00]),
            Err(ProtocolError::TruncatedPacket(3))
        ));
    }
}
