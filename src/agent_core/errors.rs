//! Agent Core error types.

use thiserror::Error;

/// Errors that can occur while configuring or running the orchestration core.
///
/// Per-call failures never show up here. They become `error` or `timeout`
/// outcomes inside the execution report.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A routing table failed validation.
    #[error("invalid routing table: {reason}")]
    RoutingTableInvalid { reason: String },

    /// Configuration could not be found, read, or validated.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// A retried operation ran out of attempts.
    #[error("retry exhausted after {attempts} attempts: {reason}")]
    RetryExhausted { attempts: u32, reason: String },
}
