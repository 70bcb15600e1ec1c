//! Simulated miIO device for integration tests.
//!
//! Binds a loopback UDP socket and answers handshakes and encrypted calls
//! the way real firmware does, with configurable misbehavior (corrupted
//! checksums, silence, device-reported errors).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::UdpSocket;

use miio_protocol::config::{HANDSHAKE_FLAG, TOKEN_SIZE};
use miio_protocol::core::Packet;
use miio_protocol::protocol::session::parse_token;
use miio_protocol::protocol::{Protocol, Request};
use miio_protocol::utils::crypto;

pub const DEVICE_ID: u32 = 0x0004_3abc;
pub const TOKEN_HEX: &str = "00112233445566778899aabbccddeeff";
pub const HANDSHAKE_TIMESTAMP: u32 = 10_000;

/// How the simulated device answers method calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Valid reply with result `["on"]`
    Normal,
    /// Valid reply except for one flipped checksum byte
    CorruptChecksum,
    /// Never replies to anything
    Silent,
    /// Valid reply carrying the error variant
    DeviceError,
    /// Valid reply with result `[<request id>]`, and every second reply is
    /// held back and sent after the next one (exercises unordered matching)
    EchoIdSwapped,
}

pub struct FakeDevice {
    pub addr: SocketAddr,
    pub handshakes: Arc<AtomicUsize>,
    pub requests: Arc<AtomicUsize>,
    /// Timestamp field carried by the most recent request packet
    pub last_request_timestamp: Arc<AtomicUsize>,
}

impl FakeDevice {
    pub async fn spawn(behavior: Behavior) -> Self {
        Self::spawn_with_handshake_delay(behavior, Duration::ZERO).await
    }

    /// `handshake_delay` holds every handshake reply back, leaving a window
    /// in which concurrent callers can pile onto the single-flight gate.
    pub async fn spawn_with_handshake_delay(behavior: Behavior, handshake_delay: Duration) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let handshakes = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));
        let last_request_timestamp = Arc::new(AtomicUsize::new(0));

        let handshake_count = Arc::clone(&handshakes);
        let request_count = Arc::clone(&requests);
        let request_timestamp = Arc::clone(&last_request_timestamp);
        tokio::spawn(async move {
            let token = parse_token(TOKEN_HEX).unwrap();
            let protocol = Protocol::new(DEVICE_ID, token);
            let (key, iv) = derive_key_iv(&token);

            let mut held_back: Option<(Vec<u8>, SocketAddr)> = None;
            let mut buf = vec![0u8; 65536];
            loop {
                let (len, src) = match socket.recv_from(&mut buf).await {
                    Ok(ok) => ok,
                    Err(_) => return,
                };
                let packet = match Packet::from_bytes(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(_) => continue,
                };

                if Protocol::is_handshake(&packet) {
                    handshake_count.fetch_add(1, Ordering::SeqCst);
                    if behavior == Behavior::Silent {
                        continue;
                    }
                    if !handshake_delay.is_zero() {
                        tokio::time::sleep(handshake_delay).await;
                    }
                    let reply = Packet {
                        flag: HANDSHAKE_FLAG,
                        device_id: DEVICE_ID,
                        timestamp: HANDSHAKE_TIMESTAMP,
                        checksum: [0; 16],
                        payload: Vec::new(),
                    };
                    socket.send_to(&reply.to_bytes(), src).await.unwrap();
                    continue;
                }

                let seen = request_count.fetch_add(1, Ordering::SeqCst);
                request_timestamp.store(packet.timestamp as usize, Ordering::SeqCst);
                if behavior == Behavior::Silent {
                    continue;
                }

                let plaintext = crypto::decrypt(&key, &iv, &packet.payload).unwrap();
                let trimmed = match plaintext.iter().rposition(|&b| b != 0) {
                    Some(last) => &plaintext[..=last],
                    None => &plaintext[..],
                };
                let request: Request = serde_json::from_slice(trimmed).unwrap();

                let body = match behavior {
                    Behavior::DeviceError => json!({
                        "id": request.id,
                        "error": { "code": -9999, "message": "user ack timeout" },
                    }),
                    Behavior::EchoIdSwapped => json!({
                        "id": request.id,
                        "result": [request.id],
                    }),
                    _ => json!({ "id": request.id, "result": ["on"] }),
                };

                let mut reply = encode_reply(&protocol, &key, &iv, packet.timestamp + 1, &body);
                if behavior == Behavior::CorruptChecksum {
                    reply[20] ^= 0xff;
                }

                if behavior == Behavior::EchoIdSwapped && seen % 2 == 0 {
                    held_back = Some((reply, src));
                    continue;
                }
                socket.send_to(&reply, src).await.unwrap();
                if let Some((earlier, earlier_src)) = held_back.take() {
                    socket.send_to(&earlier, earlier_src).await.unwrap();
                }
            }
        });

        Self {
            addr,
            handshakes,
            requests,
            last_request_timestamp,
        }
    }
}

pub fn derive_key_iv(token: &[u8; TOKEN_SIZE]) -> ([u8; TOKEN_SIZE], [u8; TOKEN_SIZE]) {
    let key = crypto::digest(token);
    let mut concat = key.to_vec();
    concat.extend_from_slice(token);
    (key, crypto::digest(&concat))
}

fn encode_reply(
    protocol: &Protocol,
    key: &[u8; TOKEN_SIZE],
    iv: &[u8; TOKEN_SIZE],
    timestamp: u32,
    body: &Value,
) -> Vec<u8> {
    let mut plaintext = serde_json::to_vec(body).unwrap();
    plaintext.push(0);
    let payload = crypto::encrypt(key, iv, &plaintext);
    let packet = Packet {
        flag: 0,
        device_id: DEVICE_ID,
        timestamp,
        checksum: protocol.checksum(DEVICE_ID, timestamp, &payload),
        payload,
    };
    packet.to_bytes().to_vec()
}
