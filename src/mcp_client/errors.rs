//! Capability boundary error types.

use thiserror::Error;

/// Errors raised while dispatching a call through the capability boundary.
#[derive(Debug, Error)]
pub enum McpError {
    /// No capability group is registered under this server name.
    #[error("unknown server: '{name}'")]
    UnknownServer {
        name: String,
    },

    /// The server exists but does not expose this tool.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// Tool call arguments failed validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        reason: String,
    },

    /// The capability backend went away mid-call.
    #[error("server '{name}' crashed: {reason}")]
    ServerCrashed {
        name: String,
        reason: String,
    },

    /// Communication with the backend failed.
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },
}

impl McpError {
    /// Transient failures worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            McpError::ServerCrashed { .. } | McpError::TransportError { .. }
        )
    }

    /// Short kind label used in error outcome payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            McpError::UnknownServer { .. } => "UnknownServer",
            McpError::UnknownTool { .. } => "UnknownTool",
            McpError::InvalidArguments { .. } => "InvalidArguments",
            McpError::ServerCrashed { .. } => "ServerCrashed",
            McpError::TransportError { .. } => "TransportError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retriable() {
        let crashed = McpError::ServerCrashed {
            name: "browser".into(),
            reason: "pipe closed".into(),
        };
        let transport = McpError::TransportError {
            server: "news".into(),
            reason: "reset".into(),
        };
        assert!(crashed.is_retriable());
        assert!(transport.is_retriable());
    }

    #[test]
    fn test_caller_errors_are_not_retriable() {
        let err = McpError::InvalidArguments {
            tool: "leann.leann_search".into(),
            reason: "missing required field: 'query'".into(),
        };
        assert!(!err.is_retriable());
        assert_eq!(err.kind(), "InvalidArguments");
        assert!(!McpError::UnknownServer { name: "x".into() }.is_retriable());
    }
}
