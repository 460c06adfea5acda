//! Transport port: the uniform client contract over tool-provider servers.

use crate::tool_registry::domain::{ServerHealthSnapshot, ServerId, ToolDefinition, ToolServer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for transport operations.
pub type ToolTransportResult<T> = Result<T, ToolTransportError>;

/// A single tool invocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier correlating the call with a later cancellation.
    pub call_id: String,
    /// Tool name as listed by the server.
    pub tool_name: String,
    /// Tool arguments.
    pub arguments: Value,
    /// Upper bound the server is asked to respect.
    pub timeout: Duration,
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
        timeout: Duration,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
            timeout,
        }
    }
}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool result payload.
    pub content: Value,
    /// Optional resource accounting reported by the server.
    pub resource_usage: Option<Value>,
}

impl ToolOutput {
    /// Creates an output without resource accounting.
    #[must_use]
    pub const fn new(content: Value) -> Self {
        Self {
            content,
            resource_usage: None,
        }
    }

    /// Attaches resource accounting.
    #[must_use]
    pub fn with_resource_usage(mut self, resource_usage: Value) -> Self {
        self.resource_usage = Some(resource_usage);
        self
    }
}

/// Client contract every concrete transport implements.
///
/// Dropping a future returned by [`ToolTransport::invoke`] abandons the call;
/// [`ToolTransport::cancel`] additionally tells the server to stop work.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Lists the tools exposed by the server.
    async fn list_tools(&self, server: &ToolServer) -> ToolTransportResult<Vec<ToolDefinition>>;

    /// Invokes one tool.
    async fn invoke(&self, server: &ToolServer, call: &ToolCall) -> ToolTransportResult<ToolOutput>;

    /// Performs a lightweight liveness probe.
    async fn probe(&self, server: &ToolServer) -> ToolTransportResult<ServerHealthSnapshot>;

    /// Requests cancellation of an in-flight call.
    async fn cancel(&self, server: &ToolServer, call_id: &str) -> ToolTransportResult<()>;
}

/// Errors returned by transport adapters.
#[derive(Debug, Clone, Error)]
pub enum ToolTransportError {
    /// The server could not be reached.
    #[error("tool server {server_id} is unreachable: {reason}")]
    Unreachable {
        /// Server identifier.
        server_id: ServerId,
        /// Reason string.
        reason: String,
    },

    /// The tool ran and reported an application-level error.
    #[error("tool '{tool_name}' failed: {message}")]
    ToolFailed {
        /// Tool name.
        tool_name: String,
        /// Error message reported by the tool.
        message: String,
    },

    /// The server did not answer in time.
    #[error("tool server {0} timed out")]
    TimedOut(ServerId),

    /// The server answered with a malformed payload.
    #[error("protocol error from tool server {server_id}: {reason}")]
    Protocol {
        /// Server identifier.
        server_id: ServerId,
        /// Reason string.
        reason: String,
    },

    /// The server transport is unsupported by this adapter.
    #[error("unsupported transport for tool server {server_id}: {reason}")]
    UnsupportedTransport {
        /// Server identifier.
        server_id: ServerId,
        /// Reason string.
        reason: String,
    },

    /// Generic runtime failure.
    #[error("tool transport runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl ToolTransportError {
    /// Wraps a runtime error from the transport adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }

    /// Returns whether the failure means the server itself is unavailable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}
