//! Request-scoped context, cancellation, and bounded concurrency.
//!
//! Every async boundary in the workspace takes a [`RequestContext`].
//! Cancellation is cooperative: work that has not started is skipped, while
//! in-flight I/O completes unless the operation itself checks the token.

use crate::errors::{ErrorCode, ErrorEnvelope};
use crate::result::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// Correlation identifier for logging and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

impl CorrelationId {
    /// Parse an identifier from caller input; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlation id must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Create a process-unique `req_*` identifier.
    #[must_use]
    pub fn next_request() -> Self {
        let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("req_{n}").as_str()))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Clonable, awaitable cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a token in the live state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake all waiters (idempotent).
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Request-scoped context threaded through all boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a context with an auto-generated request id.
    #[must_use]
    pub fn for_request() -> Self {
        Self::new(CorrelationId::next_request())
    }

    /// Create a context sharing an existing cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Clone the cancellation token for sharing.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns true once the request is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Wait until the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Fail with a cancellation error when the request is cancelled.
    pub fn ensure_live(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

/// A permit held while a limited task runs.
#[derive(Debug)]
pub struct TaskPermit {
    _permit: OwnedSemaphorePermit,
}

/// Semaphore-backed concurrency limiter with cancellation-aware acquisition.
///
/// Producers block in `acquire` when all permits are out, which is how the
/// pipeline expresses backpressure between its stages.
#[derive(Debug, Clone)]
pub struct TaskLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl TaskLimiter {
    /// Create a limiter with the given number of permits.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "limiter capacity must be positive",
            ));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently available permits.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a permit, waiting for capacity; fails on cancellation.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<TaskPermit> {
        ctx.ensure_live("limiter.acquire")?;

        let semaphore = Arc::clone(&self.semaphore);
        tokio::select! {
            () = ctx.cancelled() => Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", "limiter.acquire")),
            permit = semaphore.acquire_owned() => {
                permit.map(|permit| TaskPermit { _permit: permit }).map_err(|_| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::internal(),
                        "limiter semaphore closed",
                        crate::errors::ErrorClass::NonRetriable,
                    )
                })
            }
        }
    }
}
