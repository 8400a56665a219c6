//! Agent Core: tool-call orchestration for the conversational agent.
//!
//! Submodules:
//! - `question_router`: Self-inspection detection, routing table, time/news shortcuts
//! - `tool_router`: ExecutionCoordinator: timeouts, selective retry, ordered reports
//! - `retry`: Exponential backoff with jitter
//! - `metrics`: Per-capability usage, latency, and error counters
//! - `config`: `orchestrator.yaml` loading with env interpolation
//! - `types`: Routing decisions, call outcomes, execution reports
//! - `errors`: Agent-level error types

pub mod config;
pub mod errors;
pub mod metrics;
pub mod question_router;
pub mod retry;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use config::{DispatchMode, OrchestratorConfig};
pub use errors::AgentError;
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use question_router::{
    classify_question, QuestionKind, RouteRule, RoutingClassifier, RoutingTable,
};
pub use retry::{retry, RetryError, RetryPolicy};
pub use tool_router::{ExecutionCoordinator, Probe};
pub use types::{
    AnalysisTool, CallOutcome, CallStatus, ExecutionReport, RoutingDecision,
};
