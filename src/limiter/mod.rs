//! Process-wide admission control for generation requests.
//!
//! Generation is expensive, so the service refuses work instead of queueing
//! it. A limiter built with `limit` hands out `limit - 1` permits; a request
//! that cannot get one immediately is rejected with [`ChatError::Busy`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{ChatError, Result};

/// Bounded, non-blocking request counter shared by all handlers.
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Proof of admission. The slot is returned when this is dropped, on every
/// exit path including panics and cancelled futures.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl RequestLimiter {
    /// A limit of 1 admits nothing.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.saturating_sub(1))),
            limit,
        }
    }

    /// Take a slot without waiting.
    pub fn try_acquire(&self) -> Result<LimiterPermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(LimiterPermit { _permit: permit }),
            Err(_) => {
                debug!(limit = self.limit, "request rejected: limiter saturated");
                Err(ChatError::Busy)
            }
        }
    }

    /// Whether a request arriving now would be admitted. Probes by taking and
    /// immediately releasing a slot.
    pub fn is_available(&self) -> bool {
        self.try_acquire().is_ok()
    }

    /// Run `fut` inside a slot, releasing it when `fut` completes or is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.try_acquire()?;
        fut.await
    }

    /// Synchronous variant of [`run`](Self::run).
    pub fn run_blocking<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _permit = self.try_acquire()?;
        f()
    }

    /// Slots currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The configured concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}
