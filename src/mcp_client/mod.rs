//! Capability boundary: how tool calls reach backend capabilities.
//!
//! This module handles:
//! - The [`CapabilityExecutor`] trait the coordinator dispatches through
//! - In-process [`CapabilityHandler`]s grouped by server name
//! - Tool lookup and required-argument validation in [`CapabilityRegistry`]
//! - Boundary error classification (transient vs permanent)
//!
//! Backends themselves (code index, browser automation, news) live outside
//! this crate and plug in as handlers or as their own executor.

pub mod client;
pub mod errors;
pub mod registry;
pub mod types;

// Re-exports for convenience
pub use client::{CapabilityExecutor, CapabilityHandler};
pub use errors::McpError;
pub use registry::CapabilityRegistry;
pub use types::{CapabilityResponse, ResponseStatus, ToolDefinition};
