//! Model-output interpretation.
//!
//! Turns free-form text emitted by the language model into structured
//! [`ToolCall`] records. Two encodings are supported, each behind its own
//! [`tool_call_parser::ToolCallStrategy`]:
//! - labeled JSON (`TOOL_CALL: {"server": …, "tool": …, "args": {…}}`)
//! - invoke tags (`<invoke name="use_mcp_tool">…</invoke>`)
//!
//! Parsing never fails a turn. Malformed fragments are logged and skipped.

pub mod errors;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use errors::InferenceError;
pub use tool_call_parser::{
    extract_tool_calls, InvokeTagStrategy, LabeledJsonStrategy, ToolCallParser, ToolCallStrategy,
};
pub use types::{args_from_value, ToolArgs, ToolCall};
