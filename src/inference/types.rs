//! Shared types for tool-call extraction.
//!
//! `ToolCall` is the single record every textual encoding normalizes to,
//! whether it came from model output or from the question router.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Argument mapping carried by a tool call. Keys are unique by construction.
pub type ToolArgs = Map<String, Value>;

/// A structured tool invocation extracted from model text or produced by routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Generated correlation id (`call_<uuid>`), only used for logs.
    pub id: String,
    /// Capability group that owns the tool, e.g. `"leann"`.
    pub server: String,
    /// Operation name within the server, e.g. `"leann_search"`.
    pub tool_name: String,
    /// Arguments. Never null: absent arguments are an empty map.
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolCall {
    /// Build a tool call with a fresh correlation id.
    pub fn new(server: impl Into<String>, tool_name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4()),
            server: server.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    /// Fully qualified `server.tool` name, used as the metrics key.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.server, self.tool_name)
    }

    /// Both identifiers are present.
    pub fn is_well_formed(&self) -> bool {
        !self.server.trim().is_empty() && !self.tool_name.trim().is_empty()
    }
}

/// Convert a JSON value into an argument map.
///
/// `null` collapses to an empty map, an object is taken as-is, and a string
/// holding a JSON object is decoded (some models double-encode arguments).
/// Anything else is rejected.
pub fn args_from_value(value: Value) -> Option<ToolArgs> {
    match value {
        Value::Null => Some(Map::new()),
        Value::Object(map) => Some(map),
        Value::String(raw) if raw.trim().is_empty() => Some(Map::new()),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}
