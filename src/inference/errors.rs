//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Parse errors are
//! never surfaced past the parser: each strategy logs and skips the fragment.
//! They exist so strategies can use `?` internally and report one reason.

use thiserror::Error;

/// Errors that can occur while interpreting model output.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// A tool-call fragment could not be decoded.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError {
        raw_response: String,
        reason: String,
    },

    /// A decoded tool call was missing its server or tool name.
    #[error("incomplete tool call: {reason}")]
    IncompleteToolCall {
        reason: String,
    },
}

impl InferenceError {
    /// Short, log-safe preview of the offending fragment.
    pub fn fragment_preview(&self) -> Option<&str> {
        match self {
            InferenceError::ToolCallParseError { raw_response, .. } => {
                let end = raw_response
                    .char_indices()
                    .nth(100)
                    .map(|(idx, _)| idx)
                    .unwrap_or(raw_response.len());
                Some(&raw_response[..end])
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_preview_truncates() {
        let err = InferenceError::ToolCallParseError {
            raw_response: "x".repeat(250),
            reason: "bad".into(),
        };
        assert_eq!(err.fragment_preview().map(str::len), Some(100));
    }

    #[test]
    fn test_fragment_preview_short_fragment() {
        let err = InferenceError::ToolCallParseError {
            raw_response: "{oops".into(),
            reason: "bad".into(),
        };
        assert_eq!(err.fragment_preview(), Some("{oops"));
    }

    #[test]
    fn test_fragment_preview_none_for_incomplete() {
        let err = InferenceError::IncompleteToolCall {
            reason: "empty server".into(),
        };
        assert!(err.fragment_preview().is_none());
        assert!(err.to_string().contains("empty server"));
    }
}
