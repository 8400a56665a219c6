//! Shared types for the capability boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status reported by a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// What a capability returns for one call.
///
/// `result_or_analysis` is opaque to the orchestration layer. It is passed
/// through to outcomes untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub result_or_analysis: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapabilityResponse {
    /// A successful response carrying `payload`.
    pub fn success(payload: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            result_or_analysis: payload,
            error: None,
        }
    }

    /// A capability-reported failure.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            result_or_analysis: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Tool definition declared by a capability handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "inputSchema")]
    pub params_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, params_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params_schema,
        }
    }

    /// Field names listed under `required` in the parameter schema.
    pub fn required_fields(&self) -> Vec<&str> {
        self.params_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"status": "success", "result_or_analysis": {"files": 12}}"#;
        let resp: CapabilityResponse = serde_json::from_str(json).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.result_or_analysis["files"], 12);
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_error_response_omits_nothing_needed() {
        let resp = CapabilityResponse::error("index not built");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "index not built");
    }

    #[test]
    fn test_required_fields() {
        let def = ToolDefinition::new(
            "leann_search",
            "Semantic search over the code index",
            json!({"type": "object", "required": ["index_name", "query"]}),
        );
        assert_eq!(def.required_fields(), vec!["index_name", "query"]);
    }

    #[test]
    fn test_tool_definition_schema_alias() {
        let json = r#"{"name": "fetch_news", "inputSchema": {"required": ["topic"]}}"#;
        let def: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.required_fields(), vec!["topic"]);
        assert!(def.description.is_empty());
    }
}
