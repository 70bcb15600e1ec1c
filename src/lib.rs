//! # miIO Protocol
//!
//! Async client for the proprietary binary UDP protocol ("miIO") used to
//! control and query smart-home devices.
//!
//! ## Features
//! - Strict codec for the fixed 32-byte header + payload wire frame
//! - Session key/IV derivation from the shared device token and the
//!   protocol's checksum-via-token-substitution integrity scheme
//! - AES-128-CBC encrypted JSON request/response framing
//! - Request/response correlation over unordered UDP with bounded retries
//!   and per-attempt timeouts
//! - Handshake lifecycle with freshness tracking and single-flight
//!   deduplication across concurrent calls
//!
//! ## Example
//! ```rust,no_run
//! use miio_protocol::{CallOptions, Device, DiscoverParams};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> miio_protocol::Result<()> {
//!     let device = Device::discover(
//!         DiscoverParams {
//!             address: "192.168.1.45".parse().unwrap(),
//!             token: "00112233445566778899aabbccddeeff".to_string(),
//!         },
//!         None,
//!     )
//!     .await?;
//!
//!     let power = device
//!         .call("get_prop", Some(json!(["power"])), Some(CallOptions::default()))
//!         .await?;
//!     println!("power: {power}");
//!
//!     device.destroy();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use config::CallOptions;
pub use device::{Device, DeviceParams, DiscoverParams, Handshake};
pub use error::{ProtocolError, Result};
pub use protocol::{Protocol, Request, Response};
