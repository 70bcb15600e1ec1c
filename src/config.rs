//! # Configuration
//!
//! Protocol constants and per-call options for the miIO client.
//!
//! ## Configuration Sources
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `CallOptions::from_env()`
//!
//! The wire-level constants are fixed by the protocol and are not
//! configurable: changing them breaks interoperability with real devices.

use std::time::Duration;

/// Magic bytes identifying a miIO frame (first two header bytes, big-endian)
pub const MAGIC: u16 = 0x2131;

/// Fixed header size in bytes; a frame of exactly this length is a handshake
pub const HEADER_SIZE: usize = 32;

/// Size of the MD5 checksum field at header offset 16
pub const CHECKSUM_SIZE: usize = 16;

/// Size of the shared device token (and of the derived AES key and IV)
pub const TOKEN_SIZE: usize = 16;

/// Flag value carried by handshake packets; normal packets carry 0
pub const HANDSHAKE_FLAG: u32 = 0xffff_ffff;

/// UDP port miIO devices listen on
pub const DEVICE_PORT: u16 = 54321;

/// A session older than this requires a fresh handshake before the next call
pub const MAX_CALL_INTERVAL: Duration = Duration::from_secs(60);

/// Per-call retry and timeout options.
///
/// Applies to both handshakes and method calls. Each of the `attempts`
/// network exchanges is given `timeout` to produce a matching reply, with
/// `delay` between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Total attempt budget (not "retries": 3 means at most 3 sends)
    pub attempts: usize,
    /// Fixed delay between consecutive attempts
    pub delay: Duration,
    /// Per-attempt response timeout
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(3000),
            timeout: Duration::from_millis(3000),
        }
    }
}

impl CallOptions {
    /// Load call options from the environment, falling back to defaults.
    ///
    /// Recognized variables: `MIIO_CALL_ATTEMPTS`, `MIIO_CALL_DELAY_MS`,
    /// `MIIO_CALL_TIMEOUT_MS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(attempts) = std::env::var("MIIO_CALL_ATTEMPTS") {
            if let Ok(val) = attempts.parse::<usize>() {
                options.attempts = val;
            }
        }

        if let Ok(delay) = std::env::var("MIIO_CALL_DELAY_MS") {
            if let Ok(val) = delay.parse::<u64>() {
                options.delay = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("MIIO_CALL_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                options.timeout = Duration::from_millis(val);
            }
        }

        options
    }

    /// Override the attempt budget
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Override the delay between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_recommendations() {
        let options = CallOptions::default();
        assert_eq!(options.attempts, 3);
        assert_eq!(options.delay, Duration::from_millis(3000));
        assert_eq!(options.timeout, Duration::from_millis(3000));
    }

    #[test]
    fn builder_overrides() {
        let options = CallOptions::default()
            .with_attempts(5)
            .with_delay(Duration::from_millis(10))
            .with_timeout(Duration::from_millis(20));
        assert_eq!(options.attempts, 5);
        assert_eq!(options.delay, Duration::from_millis(10));
        assert_eq!(options.timeout, Duration::from_millis(20));
    }
}
