//! # Transport
//!
//! Datagram transport with content-based reply matching.
//!
//! UDP gives no ordering, no delivery guarantee, and no per-call
//! demultiplexing, so replies are matched by what they contain (a request id
//! inside the decrypted body), never by arrival order. A single receive loop
//! owns the socket and fans every incoming datagram out to all waiters.

pub mod udp;

pub use udp::UdpTransport;
