//! UDP endpoint bound to one remote device.
//!
//! One spawned task reads the socket and broadcasts each datagram to every
//! pending `send` call; each call parses and filters independently, so
//! concurrent calls can share the endpoint without stealing each other's
//! replies. Subscriptions are torn down by drop on every exit path (match,
//! parse error, timeout), never leaked.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{constants, ProtocolError, Result};

/// Largest datagram the receive loop will accept. miIO payloads are far
/// smaller, but the device dictates the reply size.
const MAX_DATAGRAM_SIZE: usize = 65536;

/// Fan-out channel depth. Replies arrive one per outstanding request, so a
/// small buffer is plenty; a lagged waiter just skips to newer datagrams.
const RECV_CHANNEL_CAPACITY: usize = 64;

/// A UDP endpoint bound to an ephemeral local port and connected to one
/// remote device address.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    /// Taken (dropped) on close, which closes the fan-out channel and wakes
    /// pending waiters with an endpoint-closed error.
    incoming: Mutex<Option<broadcast::Sender<Bytes>>>,
    recv_loop: JoinHandle<()>,
}

impl UdpTransport {
    /// Binds an ephemeral local port and connects it to `remote`.
    #[instrument]
    pub async fn connect(remote: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if remote.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        debug!(local = %socket.local_addr()?, %remote, "UDP endpoint bound");

        let socket = Arc::new(socket);
        let (incoming, _) = broadcast::channel(RECV_CHANNEL_CAPACITY);
        let recv_loop = tokio::spawn(Self::recv_loop(Arc::clone(&socket), incoming.clone()));

        Ok(Self {
            socket,
            incoming: Mutex::new(Some(incoming)),
            recv_loop,
        })
    }

    /// Reads the socket until it fails or the transport is closed, fanning
    /// each datagram out to all current waiters.
    async fn recv_loop(socket: Arc<UdpSocket>, incoming: broadcast::Sender<Bytes>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv(&mut buf).await {
                Ok(len) => {
                    debug!(len, "Datagram received");
                    // No waiters is fine; the datagram is simply dropped
                    let _ = incoming.send(Bytes::copy_from_slice(&buf[..len]));
                }
                Err(err) => {
                    warn!(error = %err, "UDP receive failed, stopping receive loop");
                    break;
                }
            }
        }
    }

    /// Sends a datagram and waits for the first incoming datagram the caller
    /// accepts.
    ///
    /// Every datagram observed within `timeout` is run through `parse`; a
    /// parse error fails the call immediately (it is propagated, not
    /// swallowed). Parsed values for which `matches` is false are ignored,
    /// left to other concurrent waiters.
    ///
    /// # Errors
    /// `ProtocolError::Timeout` when no accepted reply arrives in time,
    /// `ProtocolError::EndpointClosed` when the transport has been closed,
    /// any `parse` error verbatim, and I/O errors from the send itself.
    pub async fn send<T, P, M>(
        &self,
        data: &[u8],
        mut parse: P,
        mut matches: M,
        timeout: Duration,
    ) -> Result<T>
    where
        P: FnMut(&[u8]) -> Result<T>,
        M: FnMut(&T) -> bool,
    {
        // Subscribe before sending so a fast reply cannot slip past;
        // dropping the receiver on any exit path is the teardown.
        let mut rx = {
            let incoming = self
                .incoming
                .lock()
                .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?;
            incoming
                .as_ref()
                .ok_or(ProtocolError::EndpointClosed)?
                .subscribe()
        };

        self.socket.send(data).await?;

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(datagram) => {
                        let parsed = parse(&datagram)?;
                        if matches(&parsed) {
                            return Ok(parsed);
                        }
                        debug!("Datagram did not match, still waiting");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Receiver lagged, skipping datagrams");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ProtocolError::EndpointClosed);
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ProtocolError::Timeout)?
    }

    /// Releases the endpoint. Pending `send` calls resolve best-effort with
    /// an endpoint-closed error.
    pub fn close(&self) {
        self.recv_loop.abort();
        if let Ok(mut incoming) = self.incoming.lock() {
            incoming.take();
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.recv_loop.abort();
    }
}
