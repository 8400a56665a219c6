//! Tool call parsing: normalizes model output to `ToolCall` structs.
//!
//! Two independent encodings are recognized, each behind its own
//! [`ToolCallStrategy`]:
//!
//! 1. **labeled_json**: a marker followed by a JSON object:
//!    ```text
//!    TOOL_CALL: {"server": "browser", "tool": "extract_text", "args": {"selector": ".content"}}
//!    ```
//!    The marker is case and spacing tolerant (`tool_call:`, `Tool Call:`).
//!
//! 2. **invoke_tag**: a nested tag block with three parameters in fixed order:
//!    ```text
//!    <invoke name="use_mcp_tool">
//!      <parameter name="server_name">leann</parameter>
//!      <parameter name="tool_name">leann_search</parameter>
//!      <parameter name="arguments">{"query": "class definitions"}</parameter>
//!    </invoke>
//!    ```
//!
//! Extraction never fails. A malformed fragment is logged and skipped, and
//! scanning resumes with the next candidate. Results are concatenated per
//! strategy in registration order, so every labeled-JSON call precedes every
//! tag-form call regardless of where they sit in the text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::errors::InferenceError;
use super::types::{args_from_value, ToolCall};

// ─── Strategy Interface ──────────────────────────────────────────────────────

/// One textual tool-call grammar.
pub trait ToolCallStrategy: Send + Sync {
    /// Stable name used in log fields.
    fn name(&self) -> &'static str;

    /// Cheap check: does the text contain anything this grammar would try to parse?
    fn detects(&self, text: &str) -> bool;

    /// Every candidate found, in left-to-right order. Failures are reported
    /// per fragment so the caller can log them and keep the rest.
    fn extract(&self, text: &str) -> Vec<Result<ToolCall, InferenceError>>;
}

// ─── Labeled JSON ────────────────────────────────────────────────────────────

static LABEL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btool[\s_]*call\s*:").expect("label marker pattern is valid")
});

/// Wire shape of a labeled JSON record.
#[derive(Debug, Deserialize)]
struct LabeledPayload {
    #[serde(default)]
    server: String,
    #[serde(default, alias = "tool_name")]
    tool: String,
    #[serde(default, alias = "arguments")]
    args: Value,
}

/// `TOOL_CALL: {...}` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabeledJsonStrategy;

impl LabeledJsonStrategy {
    /// Decode the JSON object that starts at `rest`.
    ///
    /// Returns the call and the number of bytes consumed, so the scan can
    /// skip markers that occur inside the object's own string values.
    fn decode_at(rest: &str) -> (Result<ToolCall, InferenceError>, usize) {
        let trimmed = rest.trim_start();
        let leading_ws = rest.len() - trimmed.len();

        if !trimmed.starts_with('{') {
            return (
                Err(InferenceError::ToolCallParseError {
                    raw_response: trimmed.to_string(),
                    reason: "marker is not followed by a JSON object".into(),
                }),
                leading_ws,
            );
        }

        let mut stream = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                let consumed = leading_ws + stream.byte_offset();
                (Self::into_call(value, trimmed), consumed)
            }
            Some(Err(e)) => (
                Err(InferenceError::ToolCallParseError {
                    raw_response: trimmed.to_string(),
                    reason: format!("invalid JSON: {e}"),
                }),
                leading_ws + 1,
            ),
            None => (
                Err(InferenceError::ToolCallParseError {
                    raw_response: String::new(),
                    reason: "unexpected end of input".into(),
                }),
                leading_ws,
            ),
        }
    }

    fn into_call(value: Value, raw: &str) -> Result<ToolCall, InferenceError> {
        let payload: LabeledPayload =
            serde_json::from_value(value).map_err(|e| InferenceError::ToolCallParseError {
                raw_response: raw.to_string(),
                reason: format!("unexpected record shape: {e}"),
            })?;

        let args = args_from_value(payload.args).ok_or_else(|| {
            InferenceError::ToolCallParseError {
                raw_response: raw.to_string(),
                reason: "args must be a JSON object".into(),
            }
        })?;

        let call = ToolCall::new(payload.server.trim(), payload.tool.trim(), args);
        if !call.is_well_formed() {
            return Err(InferenceError::IncompleteToolCall {
                reason: "labeled record is missing `server` or `tool`".into(),
            });
        }
        Ok(call)
    }
}

impl ToolCallStrategy for LabeledJsonStrategy {
    fn name(&self) -> &'static str {
        "labeled_json"
    }

    fn detects(&self, text: &str) -> bool {
        LABEL_MARKER.is_match(text)
    }

    fn extract(&self, text: &str) -> Vec<Result<ToolCall, InferenceError>> {
        let mut results = Vec::new();
        let mut resume_at = 0;

        for marker in LABEL_MARKER.find_iter(text) {
            // Markers quoted inside a previous record's arguments are not calls.
            if marker.start() < resume_at {
                continue;
            }
            let (result, consumed) = Self::decode_at(&text[marker.end()..]);
            if result.is_ok() {
                resume_at = marker.end() + consumed;
            }
            results.push(result);
        }

        results
    }
}

// ─── Invoke Tag ──────────────────────────────────────────────────────────────

static INVOKE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<invoke\s+name\s*=\s*"use_mcp_tool"\s*>(.*?)</invoke>"#)
        .expect("invoke block pattern is valid")
});

static INVOKE_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<parameter\s+name\s*=\s*"server_name"\s*>(.*?)</parameter>.*?<parameter\s+name\s*=\s*"tool_name"\s*>(.*?)</parameter>.*?<parameter\s+name\s*=\s*"arguments"\s*>(.*?)</parameter>"#,
    )
    .expect("invoke parameter pattern is valid")
});

/// `<invoke name="use_mcp_tool">…</invoke>` strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct InvokeTagStrategy;

impl InvokeTagStrategy {
    fn decode_block(block: &str) -> Result<ToolCall, InferenceError> {
        let caps = INVOKE_PARAMS
            .captures(block)
            .ok_or_else(|| InferenceError::ToolCallParseError {
                raw_response: block.to_string(),
                reason: "expected server_name, tool_name and arguments parameters in order".into(),
            })?;

        let server = caps.get(1).map_or("", |m| m.as_str()).trim();
        let tool_name = caps.get(2).map_or("", |m| m.as_str()).trim();
        let raw_args = caps.get(3).map_or("", |m| m.as_str()).trim();

        let args_value: Value = if raw_args.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(raw_args).map_err(|e| InferenceError::ToolCallParseError {
                raw_response: raw_args.to_string(),
                reason: format!("invalid arguments JSON: {e}"),
            })?
        };

        let args = args_from_value(args_value).ok_or_else(|| {
            InferenceError::ToolCallParseError {
                raw_response: raw_args.to_string(),
                reason: "arguments must be a JSON object".into(),
            }
        })?;

        let call = ToolCall::new(server, tool_name, args);
        if !call.is_well_formed() {
            return Err(InferenceError::IncompleteToolCall {
                reason: "invoke block has an empty server_name or tool_name".into(),
            });
        }
        Ok(call)
    }
}

impl ToolCallStrategy for InvokeTagStrategy {
    fn name(&self) -> &'static str {
        "invoke_tag"
    }

    fn detects(&self, text: &str) -> bool {
        text.contains("<invoke") && text.contains("use_mcp_tool")
    }

    fn extract(&self, text: &str) -> Vec<Result<ToolCall, InferenceError>> {
        INVOKE_BLOCK
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|block| Self::decode_block(block.as_str()))
            .collect()
    }
}

// ─── Parser ──────────────────────────────────────────────────────────────────

/// Runs every registered strategy over a block of model output.
pub struct ToolCallParser {
    strategies: Vec<Box<dyn ToolCallStrategy>>,
}

impl Default for ToolCallParser {
    fn default() -> Self {
        Self {
            strategies: vec![Box::new(LabeledJsonStrategy), Box::new(InvokeTagStrategy)],
        }
    }
}

impl ToolCallParser {
    /// A parser with no strategies. Add them with [`ToolCallParser::with_strategy`].
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy. Its results are concatenated after earlier strategies.
    pub fn with_strategy(mut self, strategy: Box<dyn ToolCallStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Names of the registered strategies, in run order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Whether any strategy sees a candidate in the text.
    pub fn looks_like_tool_call(&self, text: &str) -> bool {
        self.strategies.iter().any(|s| s.detects(text))
    }

    /// Extract all well-formed tool calls. Never fails.
    pub fn extract(&self, text: &str) -> Vec<ToolCall> {
        let mut calls = Vec::new();

        for strategy in &self.strategies {
            if !strategy.detects(text) {
                continue;
            }
            for result in strategy.extract(text) {
                match result {
                    Ok(call) => {
                        tracing::debug!(
                            strategy = strategy.name(),
                            call_id = %call.id,
                            tool = %call.qualified_name(),
                            "parsed tool call"
                        );
                        calls.push(call);
                    }
                    Err(e) => {
                        tracing::warn!(
                            strategy = strategy.name(),
                            fragment = e.fragment_preview().unwrap_or(""),
                            error = %e,
                            "skipping malformed tool call"
                        );
                    }
                }
            }
        }

        calls
    }
}

static DEFAULT_PARSER: LazyLock<ToolCallParser> = LazyLock::new(ToolCallParser::default);

/// Extract tool calls using both built-in encodings.
pub fn extract_tool_calls(text: &str) -> Vec<ToolCall> {
    DEFAULT_PARSER.extract(text)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
