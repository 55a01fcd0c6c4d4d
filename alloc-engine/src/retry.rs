//! The engine never retries on its own. Callers that want to ride out lost
//! races and short repository outages use [`allocate_with_retry`], which
//! starts over from subnet selection on a fresh topology snapshot each time.
use std::time::Duration;

use alloc_core::{config::cli::EngineOpts, tokio};
use config::TopologyStore;
use lease_store::LeaseRepository;
use tracing::{debug, warn};

use crate::{
    context::{AllocMode, ClientContext},
    engine::{AllocEngine, Allocation},
    error::AllocError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// total attempts, including the first
    pub max_attempts: u32,
    /// wait before the second attempt, doubled for each one after
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EngineOpts::default())
    }
}

impl From<&EngineOpts> for RetryPolicy {
    fn from(opts: &EngineOpts) -> Self {
        Self {
            max_attempts: opts.retry_attempts.max(1),
            backoff: opts.retry_backoff(),
        }
    }
}

impl RetryPolicy {
    /// wait after failed attempt number `attempt` (1-based)
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

pub async fn allocate_with_retry<R: LeaseRepository>(
    engine: &AllocEngine<R>,
    store: &TopologyStore,
    ctx: &mut ClientContext,
    mode: AllocMode,
    policy: RetryPolicy,
) -> Result<Allocation, AllocError> {
    let mut attempt = 1;
    loop {
        let topo = store.current();
        match engine.allocate(&topo, ctx, mode).await {
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                debug!(?err, attempt, ?delay, "allocation failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                warn!(?err, attempts = attempt, "allocation failed, giving up");
                return Err(err);
            }
            res => return res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(40));
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }
}
