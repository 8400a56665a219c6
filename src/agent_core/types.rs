//! Shared types for the agent core.
//!
//! Routing decisions, per-call outcomes, and the ordered execution report
//! produced by the ExecutionCoordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inference::types::ToolArgs;

// ─── Routing ────────────────────────────────────────────────────────────────

/// Specialized analysis capabilities a self-inspection question can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTool {
    AnalyzeCodebaseIntelligence,
    AnalyzeCodebaseHealth,
    GenerateCodebaseEnhancementPlan,
    ComprehensiveSelfImprovementAnalysis,
}

impl AnalysisTool {
    pub const ALL: [AnalysisTool; 4] = [
        AnalysisTool::AnalyzeCodebaseIntelligence,
        AnalysisTool::AnalyzeCodebaseHealth,
        AnalysisTool::GenerateCodebaseEnhancementPlan,
        AnalysisTool::ComprehensiveSelfImprovementAnalysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisTool::AnalyzeCodebaseIntelligence => "analyze_codebase_intelligence",
            AnalysisTool::AnalyzeCodebaseHealth => "analyze_codebase_health",
            AnalysisTool::GenerateCodebaseEnhancementPlan => "generate_codebase_enhancement_plan",
            AnalysisTool::ComprehensiveSelfImprovementAnalysis => {
                "comprehensive_self_improvement_analysis"
            }
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == value)
    }
}

impl std::fmt::Display for AnalysisTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which analysis capability answers a self-inspection question, and with
/// what question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tool_name: AnalysisTool,
    /// Never empty, never the raw user text.
    pub canonical_question: String,
    pub args: ToolArgs,
}

// ─── Call Outcomes ──────────────────────────────────────────────────────────

/// Terminal state of one attempted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    Error,
    Timeout,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
            CallStatus::Timeout => "timeout",
        }
    }
}

/// Capability label of the synthetic outcome appended when nothing succeeded.
pub const NO_INFORMATION_CAPABILITY: &str = "no_information";

/// Payload of the synthetic outcome.
pub const NO_INFORMATION_MESSAGE: &str = "No information could be retrieved";

/// Result of one attempted call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Qualified `server.tool` name of the call.
    pub capability: String,
    pub status: CallStatus,
    pub latency_seconds: f64,
    /// Opaque result on success, `"<Kind>: <message>"` on error, absent on timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CallOutcome {
    pub fn success(capability: impl Into<String>, latency_seconds: f64, payload: Value) -> Self {
        Self {
            capability: capability.into(),
            status: CallStatus::Success,
            latency_seconds: latency_seconds.max(0.0),
            payload: Some(payload),
        }
    }

    pub fn error(
        capability: impl Into<String>,
        latency_seconds: f64,
        kind: &str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self {
            capability: capability.into(),
            status: CallStatus::Error,
            latency_seconds: latency_seconds.max(0.0),
            payload: Some(Value::String(format!("{kind}: {message}"))),
        }
    }

    pub fn timeout(capability: impl Into<String>, latency_seconds: f64) -> Self {
        Self {
            capability: capability.into(),
            status: CallStatus::Timeout,
            latency_seconds: latency_seconds.max(0.0),
            payload: None,
        }
    }

    /// The "nothing worked" marker.
    pub fn no_information() -> Self {
        Self {
            capability: NO_INFORMATION_CAPABILITY.to_string(),
            status: CallStatus::Error,
            latency_seconds: 0.0,
            payload: Some(Value::String(NO_INFORMATION_MESSAGE.to_string())),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }

    pub fn is_no_information(&self) -> bool {
        self.capability == NO_INFORMATION_CAPABILITY
    }
}

// ─── Execution Report ───────────────────────────────────────────────────────

/// Ordered outcomes for one turn, in call-issue order. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionReport {
    outcomes: Vec<CallOutcome>,
}

impl ExecutionReport {
    /// Seal a list of outcomes, appending the synthetic marker if none succeeded.
    pub fn finalize(mut outcomes: Vec<CallOutcome>) -> Self {
        if !outcomes.iter().any(CallOutcome::is_success) {
            outcomes.push(CallOutcome::no_information());
        }
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[CallOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Always false for a finalized report.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn last(&self) -> Option<&CallOutcome> {
        self.outcomes.last()
    }

    pub fn successes(&self) -> impl Iterator<Item = &CallOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn any_success(&self) -> bool {
        self.outcomes.iter().any(CallOutcome::is_success)
    }

    /// Text block fed back to the model as the turn's tool results.
    ///
    /// Successful outcomes render as `"<capability>:\n<payload>"`; failures
    /// get a single line.
    pub fn render_text(&self) -> String {
        self.outcomes
            .iter()
            .map(render_outcome)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_outcome(outcome: &CallOutcome) -> String {
    if outcome.is_no_information() {
        return NO_INFORMATION_MESSAGE.to_string();
    }
    let payload = outcome.payload.as_ref().map(payload_text);
    match (outcome.status, payload) {
        (CallStatus::Success, Some(text)) => format!("{}:\n{text}", outcome.capability),
        (CallStatus::Success, None) => format!("{}:\n(empty result)", outcome.capability),
        (CallStatus::Timeout, _) => format!(
            "{}: timed out after {:.1}s",
            outcome.capability, outcome.latency_seconds
        ),
        (CallStatus::Error, Some(text)) => format!("{}: failed ({text})", outcome.capability),
        (CallStatus::Error, None) => format!("{}: failed", outcome.capability),
    }
}

fn payload_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
