//! Retry helper with exponential backoff and deterministic-enough jitter.

use crate::context::RequestContext;
use crate::errors::ErrorEnvelope;
use crate::result::Result;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, counting the first try.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy suited to network calls: three attempts, short backoff.
    #[must_use]
    pub const fn transient() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }

    /// Single attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Retry a fallible async operation.
///
/// Only errors classified retriable are retried; the final error is returned
/// unchanged. Sleeps are cancellation-aware.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_live(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.class.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error);
                }
                let delay = backoff_delay(policy, attempt);
                tokio::select! {
                    () = ctx.cancelled() => {
                        return Err(ErrorEnvelope::cancelled("operation cancelled")
                            .with_metadata("operation", operation));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

fn backoff_delay(policy: RetryPolicy, attempt: u32) -> Duration {
    let pow = attempt.saturating_sub(1).min(20);
    let base = policy.base_delay_ms.saturating_mul(1u64 << pow);
    let capped = base.min(policy.max_delay_ms);
    // Up to 25% jitter seeded from the subsecond clock.
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    let jitter = (capped / 4).saturating_mul(nanos % 100) / 100;
    Duration::from_millis(capped.saturating_add(jitter).min(policy.max_delay_ms))
}
