//! # Device Session
//!
//! Orchestrates the lifecycle of one miIO device: handshake freshness,
//! session timestamp tracking, single-flight handshake deduplication,
//! per-call retry, and error classification.
//!
//! A [`Device`] is normally obtained through [`Device::discover`], which
//! performs the initial handshake. Callers that already know the device id
//! and last session timestamp can construct one directly with
//! [`Device::new`] and skip the extra handshake.
//!
//! Concurrent calls share one UDP endpoint; replies are correlated by the
//! request id embedded in the decrypted body, never by arrival order.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{CallOptions, DEVICE_PORT, MAX_CALL_INTERVAL};
use crate::core::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::session::parse_token;
use crate::protocol::{Protocol, Request, Response};
use crate::transport::UdpTransport;
use crate::utils::retry;

/// Result of a handshake exchange, read straight from the reply header.
/// Handshake replies are unencrypted headers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub device_id: u32,
    pub timestamp: u32,
}

type SharedHandshake =
    Shared<BoxFuture<'static, std::result::Result<Handshake, Arc<ProtocolError>>>>;

/// Mutable session state shared across concurrent calls.
/// Update discipline is last-successful-exchange-wins; the timestamp is
/// device-echoed and advisory, not a causal sequence number.
struct SessionState {
    /// Last timestamp seen from the device, echoed back on the next request
    timestamp: u32,
    /// Time of the last successful exchange; `None` means a handshake is due
    last_seen_at: Option<Instant>,
}

/// Parameters for constructing a [`Device`] directly.
///
/// `transport`, `timestamp` and `last_seen_at` exist so that
/// [`Device::discover`] can hand over its handshake result without a second
/// exchange; most callers only fill the first three fields.
pub struct DeviceParams {
    /// Device IP address (ignored when `transport` is supplied)
    pub address: IpAddr,
    /// 32-character hex device token
    pub token: String,
    /// Device identifier
    pub device_id: u32,
    /// Pre-bound transport to reuse instead of binding a new endpoint
    pub transport: Option<Arc<UdpTransport>>,
    /// Last session timestamp known for this device
    pub timestamp: Option<u32>,
    /// Time of the last known successful exchange
    pub last_seen_at: Option<Instant>,
}

/// Parameters for [`Device::discover`].
pub struct DiscoverParams {
    /// Device IP address; the port is always the fixed device port 54321
    pub address: IpAddr,
    /// 32-character hex device token
    pub token: String,
}

/// A live session with one miIO device.
pub struct Device {
    id: u32,
    protocol: Protocol,
    transport: Arc<UdpTransport>,
    state: Mutex<SessionState>,
    /// Single-flight gate: concurrent handshake triggers converge on one
    /// network exchange and share its outcome
    inflight_handshake: Arc<Mutex<Option<SharedHandshake>>>,
}

impl Device {
    /// Constructs a device session without a discovery handshake.
    ///
    /// The first `call` on a session constructed without `last_seen_at`
    /// performs a handshake before sending the request.
    ///
    /// # Errors
    /// Fails on an invalid hex token or, when no transport is supplied, on a
    /// socket bind failure.
    pub async fn new(params: DeviceParams) -> Result<Self> {
        let token = parse_token(&params.token)?;

        let transport = match params.transport {
            Some(transport) => transport,
            None => {
                let remote = SocketAddr::new(params.address, DEVICE_PORT);
                Arc::new(UdpTransport::connect(remote).await?)
            }
        };

        Ok(Self {
            id: params.device_id,
            protocol: Protocol::new(params.device_id, token),
            transport,
            state: Mutex::new(SessionState {
                timestamp: params.timestamp.unwrap_or(0),
                last_seen_at: params.last_seen_at,
            }),
            inflight_handshake: Arc::new(Mutex::new(None)),
        })
    }

    /// The device identifier this session is bound to.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Performs a handshake exchange on a bare transport.
    ///
    /// Sends the canonical handshake packet and accepts any handshake-shaped
    /// reply (header-only frame), retrying within the given options.
    #[instrument(skip(transport, options))]
    pub async fn handshake(transport: &UdpTransport, options: CallOptions) -> Result<Handshake> {
        debug!("Starting handshake");
        let data = Protocol::handshake_packet().to_bytes();

        let packet = retry(
            || async {
                transport
                    .send(
                        &data,
                        Packet::from_bytes,
                        Protocol::is_handshake,
                        options.timeout,
                    )
                    .await
            },
            options.attempts,
            options.delay,
        )
        .await?;

        debug!(
            device_id = packet.device_id,
            timestamp = packet.timestamp,
            "Handshake complete"
        );

        Ok(Handshake {
            device_id: packet.device_id,
            timestamp: packet.timestamp,
        })
    }

    /// Connects to a device, performs the initial handshake and returns a
    /// ready-to-use session.
    ///
    /// # Errors
    /// Propagates handshake failures after closing the freshly bound
    /// transport.
    pub async fn discover(params: DiscoverParams, options: Option<CallOptions>) -> Result<Self> {
        let options = options.unwrap_or_default();
        let remote = SocketAddr::new(params.address, DEVICE_PORT);
        let transport = Arc::new(UdpTransport::connect(remote).await?);

        let handshake = match Self::handshake(&transport, options).await {
            Ok(handshake) => handshake,
            Err(err) => {
                transport.close();
                return Err(err);
            }
        };

        Self::new(DeviceParams {
            address: params.address,
            token: params.token,
            device_id: handshake.device_id,
            transport: Some(transport),
            timestamp: Some(handshake.timestamp),
            last_seen_at: Some(Instant::now()),
        })
        .await
    }

    /// Joins the in-flight handshake if one exists, otherwise starts one.
    /// The slot clears itself once the shared exchange completes, success or
    /// failure alike.
    fn shared_handshake(&self, options: CallOptions) -> Result<SharedHandshake> {
        let mut slot = lock(&self.inflight_handshake)?;

        if let Some(pending) = slot.as_ref() {
            debug!("Joining in-flight handshake");
            return Ok(pending.clone());
        }

        let transport = Arc::clone(&self.transport);
        let slot_ref = Arc::clone(&self.inflight_handshake);
        let pending = async move {
            let result = Self::handshake(&transport, options).await.map_err(Arc::new);
            if let Ok(mut slot) = slot_ref.lock() {
                slot.take();
            }
            result
        }
        .boxed()
        .shared();

        *slot = Some(pending.clone());
        Ok(pending)
    }

    /// Instance-level handshake with single-flight deduplication.
    async fn session_handshake(&self, options: CallOptions) -> Result<Handshake> {
        let pending = self.shared_handshake(options)?;
        pending.await.map_err(|err| err.duplicate())
    }

    /// Calls a device method and returns its result.
    ///
    /// Performs a fresh handshake first when the session has not seen the
    /// device for longer than the freshness threshold. The reply is matched
    /// by the request id inside the decrypted body; handshake-shaped frames
    /// and other calls' replies are ignored.
    ///
    /// # Errors
    /// Frame and transport errors surface once the attempt budget is
    /// exhausted; a device-reported error surfaces immediately as
    /// `ProtocolError::DeviceError`.
    #[instrument(skip(self, params, options), fields(device_id = self.id))]
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        options: Option<CallOptions>,
    ) -> Result<Value> {
        let options = options.unwrap_or_default();

        let stale = {
            let state = lock(&self.state)?;
            state
                .last_seen_at
                .map_or(true, |seen| seen.elapsed() > MAX_CALL_INTERVAL)
        };

        if stale {
            debug!("Session stale, performing handshake");
            let handshake = self.session_handshake(options).await?;
            let mut state = lock(&self.state)?;
            state.timestamp = handshake.timestamp;
            state.last_seen_at = Some(Instant::now());
        }

        let id = rand::random::<u32>();
        let request = Request::new(id, method, params);
        debug!(id, method, "Sending request");

        let timestamp = lock(&self.state)?.timestamp;
        let packet = self.protocol.pack_request(&request, timestamp)?;
        let data = packet.to_bytes();

        let (reply, response) = retry(
            || async {
                self.transport
                    .send(
                        &data,
                        |buf| {
                            let packet = Packet::from_bytes(buf)?;
                            // Handshake frames carry no response body; they
                            // are left unmatched for any handshake waiter
                            let response = if Protocol::is_handshake(&packet) {
                                None
                            } else {
                                Some(self.protocol.unpack_response(&packet)?)
                            };
                            Ok((packet, response))
                        },
                        |(_, response): &(Packet, Option<Response>)| {
                            response.as_ref().is_some_and(|r| r.id() == id)
                        },
                        options.timeout,
                    )
                    .await
            },
            options.attempts,
            options.delay,
        )
        .await?;

        {
            let mut state = lock(&self.state)?;
            state.timestamp = reply.timestamp;
            state.last_seen_at = Some(Instant::now());
        }

        match response {
            None => Err(ProtocolError::EmptyResponse),
            Some(Response::Failure { error, .. }) => Err(ProtocolError::DeviceError {
                code: error.code,
                message: error.message,
            }),
            Some(Response::Success { result, .. }) => {
                debug!(id, "Request succeeded");
                Ok(result)
            }
        }
    }

    /// Releases the transport. The session must not be used afterwards.
    pub fn destroy(&self) {
        self.transport.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
}
