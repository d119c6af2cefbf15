//! Retry scope for units of work
//!
//! A unit of work (one file, or one queue message) is re-run from the top on
//! any error, up to `max_retries` additional attempts with a fixed delay in
//! between. Error kinds are not distinguished; only the attempt count decides
//! when to give up.

use crate::types::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    ///
    /// `op` receives the 1-based attempt number and must redo the whole unit.
    /// Each retry is logged at WARN with the error that triggered it.
    ///
    /// # Arguments
    ///
    /// * `unit` - Name of the unit of work for logs and the final error
    /// * `op` - Produces one attempt
    ///
    /// # Returns
    ///
    /// * `Ok(T)` from the first successful attempt
    /// * `Err(PipelineError::RetriesExhausted)` wrapping the last error otherwise
    pub async fn run<T, F, Fut>(&self, unit: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut last_error = match op(1).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        for attempt in 2..=max_attempts {
            warn!(
                unit,
                attempt = attempt - 1,
                max_retries = self.max_retries,
                "Retrying {} after error: {}",
                unit,
                last_error
            );
            tokio::time::sleep(self.delay()).await;

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = e,
            }
        }

        error!(unit, attempts = max_attempts, "Giving up on {}: {}", unit, last_error);
        Err(PipelineError::RetriesExhausted {
            unit: unit.to_string(),
            attempts: max_attempts,
            source: Box::new(last_error),
        })
    }
}
