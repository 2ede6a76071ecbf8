//! Bounded retry with exponential backoff for outbound I/O.
//!
//! Every request/response call that leaves the process (notifications,
//! listings) goes through [`with_backoff`] instead of ad-hoc sleep loops.

use anyhow::Result;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_backoff_ms: 0,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Run `op` until it succeeds or the policy is exhausted. Returns the
/// last error on exhaustion.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            debug!(label, attempt, delay_ms = delay.as_millis() as u64, "Retrying");
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries => {
                warn!(label, attempt, error = %e, "Attempt failed");
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("{label} failed after {} attempts", attempt + 1)));
            }
        }
    }
}
