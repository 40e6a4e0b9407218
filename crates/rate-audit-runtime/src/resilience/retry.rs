//! Timeout and bounded retry for collaborator calls.
//!
//! Every call gets its own timeout. A timed-out call is treated exactly like
//! an `Unavailable` failure: retried with exponential backoff up to the
//! configured count, then promoted to a fatal run error.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::config::{duration_human, ConfigError};
use crate::error::{CallError, RunError, Step};

/// Backoff settings for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_human")]
    pub initial_backoff: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_human")]
    pub max_backoff: Duration,

    /// Growth factor between delays
    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.factor < 1.0 {
            return Err(ConfigError::InvalidRetry(format!(
                "factor must be at least 1.0, got {}",
                self.factor
            )));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::InvalidRetry(
                "max_backoff is shorter than initial_backoff".to_string(),
            ));
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_factor(self.factor)
            .with_max_times(self.max_retries as usize)
    }
}

/// Run `op` with a per-attempt timeout, retrying transient failures.
///
/// Permanent failures stop immediately and become [`RunError::Permanent`];
/// transient ones that outlast the policy become
/// [`RunError::RetriesExhausted`].
pub async fn call_with_retry<T, F, Fut>(
    step: Step,
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<T, RunError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut retries: u32 = 0;

    let attempt = || {
        let call = op();
        async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout(timeout)),
            }
        }
    };

    let result = attempt
        .retry(policy.backoff())
        .sleep(tokio::time::sleep)
        .when(CallError::is_transient)
        .notify(|error: &CallError, delay: Duration| {
            retries += 1;
            tracing::warn!(
                step = %step,
                attempt = retries,
                delay = ?delay,
                error = %error,
                "Transient failure, retrying"
            );
        })
        .await;

    result.map_err(|source| {
        let attempts = retries + 1;
        if source.is_transient() {
            tracing::error!(step = %step, attempts, error = %source, "Retries exhausted");
            RunError::RetriesExhausted {
                step,
                attempts,
                source,
            }
        } else {
            RunError::Permanent { step, source }
        }
    })
}
