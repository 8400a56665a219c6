//! Capability registry: maps server names to in-process handlers.
//!
//! Provides:
//! - Handler lookup by server name
//! - Tool lookup by `(server, tool)` and by qualified name (`server.tool`)
//! - Required-field validation against each tool's declared schema
//! - The [`CapabilityExecutor`] implementation the coordinator dispatches through

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::inference::types::ToolArgs;

use super::client::{CapabilityExecutor, CapabilityHandler};
use super::errors::McpError;
use super::types::{CapabilityResponse, ToolDefinition};

// ─── CapabilityRegistry ──────────────────────────────────────────────────────

struct RegisteredServer {
    handler: Arc<dyn CapabilityHandler>,
    tools: IndexMap<String, ToolDefinition>,
}

/// Registered capability groups, kept in registration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    servers: IndexMap<String, RegisteredServer>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `server_name`, replacing any previous one.
    pub fn register(&mut self, server_name: impl Into<String>, handler: Arc<dyn CapabilityHandler>) {
        let server_name = server_name.into();
        let tools: IndexMap<String, ToolDefinition> = handler
            .tools()
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();

        tracing::info!(
            server = %server_name,
            tool_count = tools.len(),
            "registered capability handler"
        );

        if self
            .servers
            .insert(server_name.clone(), RegisteredServer { handler, tools })
            .is_some()
        {
            tracing::warn!(server = %server_name, "replaced existing capability handler");
        }
    }

    /// Builder-style [`Self::register`].
    pub fn with_handler(
        mut self,
        server_name: impl Into<String>,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        self.register(server_name, handler);
        self
    }

    /// Remove a server and all its tools.
    pub fn unregister(&mut self, server_name: &str) -> bool {
        self.servers.shift_remove(server_name).is_some()
    }

    /// Look up a tool definition.
    pub fn get_tool(&self, server: &str, tool_name: &str) -> Option<&ToolDefinition> {
        self.servers.get(server)?.tools.get(tool_name)
    }

    /// Look up a tool by its qualified `server.tool` name.
    pub fn get_tool_qualified(&self, qualified: &str) -> Option<&ToolDefinition> {
        let (server, tool) = qualified.split_once('.')?;
        self.get_tool(server, tool)
    }

    /// Registered server names, in registration order.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    /// Qualified names of every registered tool.
    pub fn tool_names(&self) -> Vec<String> {
        self.servers
            .iter()
            .flat_map(|(server, entry)| entry.tools.keys().map(move |t| format!("{server}.{t}")))
            .collect()
    }

    /// Number of registered tools across all servers.
    pub fn len(&self) -> usize {
        self.servers.values().map(|s| s.tools.len()).sum()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate a call: server and tool exist, required fields are present.
    ///
    /// Only the top-level `required` list is checked. Deeper validation is
    /// left to the handler.
    pub fn validate_tool_call(
        &self,
        server: &str,
        tool_name: &str,
        args: &ToolArgs,
    ) -> Result<&Arc<dyn CapabilityHandler>, McpError> {
        let entry = self.servers.get(server).ok_or_else(|| McpError::UnknownServer {
            name: server.to_string(),
        })?;

        let def = entry.tools.get(tool_name).ok_or_else(|| McpError::UnknownTool {
            name: format!("{server}.{tool_name}"),
        })?;

        if let Some(missing) = def
            .required_fields()
            .into_iter()
            .find(|field| !args.contains_key(*field))
        {
            return Err(McpError::InvalidArguments {
                tool: format!("{server}.{tool_name}"),
                reason: format!("missing required field: '{missing}'"),
            });
        }

        Ok(&entry.handler)
    }
}

#[async_trait]
impl CapabilityExecutor for CapabilityRegistry {
    async fn execute(
        &self,
        server: &str,
        tool_name: &str,
        args: &ToolArgs,
    ) -> Result<CapabilityResponse, McpError> {
        let handler = self.validate_tool_call(server, tool_name, args)?;
        handler.call(tool_name, args).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
