//! Bounded-attempt retry with a fixed delay between attempts.
//!
//! Attempts are strictly sequential: each one is awaited to completion (or
//! its own timeout) before the next begins. No exponential backoff and no
//! jitter; the miIO exchange is a single datagram each way, so a fixed delay
//! is enough.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// Invokes `attempt_fn` up to `attempts` times, sleeping `delay` between
/// failed attempts. The final error is returned unmodified once the budget
/// is exhausted.
pub async fn retry<T, F, Fut>(mut attempt_fn: F, attempts: usize, delay: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                debug!(attempt, error = %err, "Attempt failed, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop returns on the last attempt")
}
