//! Capability execution boundary.
//!
//! The orchestration layer never talks to a backend directly. Everything
//! goes through [`CapabilityExecutor::execute`], which the in-process
//! [`CapabilityRegistry`](super::registry::CapabilityRegistry) implements and
//! test doubles can implement with scripted behaviour.

use async_trait::async_trait;

use crate::inference::types::ToolArgs;

use super::errors::McpError;
use super::types::{CapabilityResponse, ToolDefinition};

/// Executes one named operation on one capability group.
#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    /// Run `server.tool_name` with `args`.
    ///
    /// A capability that ran but failed answers `Ok` with an error status.
    /// `Err` is reserved for failures of the boundary itself.
    async fn execute(
        &self,
        server: &str,
        tool_name: &str,
        args: &ToolArgs,
    ) -> Result<CapabilityResponse, McpError>;
}

/// One capability group served in-process.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Tools this handler answers for. Names are unqualified (`leann_search`).
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Handle a call that has already been validated against [`Self::tools`].
    async fn call(&self, tool_name: &str, args: &ToolArgs) -> Result<CapabilityResponse, McpError>;
}
