//! Retry with exponential backoff and jitter.
//!
//! `delay(n) = min(max_delay, base_delay * 2^(n-1)) + U[0, jitter)`, where `n`
//! is the number of failed attempts so far. A policy with `retries = 3`
//! makes at most 4 attempts. Policies are plain values handed to each call;
//! there is no process-wide retry state.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Policy ─────────────────────────────────────────────────────────────────

/// Backoff parameters for one retried operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the uniform jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
            jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Backoff before the next attempt, after `failed_attempts` failures (≥ 1).
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        let backoff_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);

        let jitter = if self.jitter_ms > 0 {
            let micros = rand::thread_rng().gen_range(0..self.jitter_ms.saturating_mul(1_000));
            Duration::from_micros(micros)
        } else {
            Duration::ZERO
        };

        Duration::from_millis(backoff_ms) + jitter
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Why a retried operation ultimately failed.
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every allowed attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The operation failed with an error the predicate rejected.
    #[error("non-retryable failure: {source}")]
    Permanent { source: E },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The last failure.
    pub fn source_error(&self) -> &E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Permanent { source } => source,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

/// Run `operation` until it succeeds, fails permanently, or runs out of retries.
///
/// `is_retryable` decides per error. A rejected error ends the loop at once.
pub async fn retry<T, E, F, Fut, P>(
    mut operation: F,
    policy: &RetryPolicy,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => {
                tracing::debug!(attempt, error = %e, "non-retryable failure");
                return Err(RetryError::Permanent { source: e });
            }
            Err(e) if attempt >= policy.max_attempts() => {
                tracing::warn!(attempts = attempt, error = %e, "retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
