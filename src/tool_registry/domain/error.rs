//! Error types for tool registry domain validation and parsing.

use super::ServerId;
use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The server name is empty after trimming.
    #[error("tool server name must not be empty")]
    EmptyServerName,

    /// The server name contains characters outside `[a-z0-9_]`.
    #[error(
        "tool server name '{0}' contains invalid characters (only lowercase alphanumeric and underscores allowed)"
    )]
    InvalidServerName(String),

    /// The server name exceeds the 100-character storage limit.
    #[error("tool server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// The process-pipe command is empty.
    #[error("process-pipe command must not be empty")]
    EmptyProcessCommand,

    /// The process-pipe working directory is empty after trimming.
    #[error("process-pipe working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// An HTTP transport URL is empty.
    #[error("transport URL must not be empty")]
    EmptyTransportUrl,

    /// An HTTP transport URL does not have an `http://` or `https://` prefix.
    #[error("transport URL '{0}' must start with 'http://' or 'https://'")]
    InvalidTransportUrl(String),

    /// A tool definition name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// A capability tag is empty after trimming.
    #[error("capability tags must not be empty")]
    EmptyCapability,

    /// A usage sample carried a negative or non-finite latency.
    #[error("usage latency must be a finite, non-negative number of milliseconds: {0}")]
    InvalidLatency(String),

    /// Discovery or probing requires the server to be active.
    #[error("tool server {0} is inactive")]
    ServerInactive(ServerId),
}

/// Error returned while parsing health status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown tool server health status: {0}")]
pub struct ParseServerHealthStatusError(pub String);

/// Error returned while parsing a transport kind from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown tool server transport kind: {0}")]
pub struct ParseTransportKindError(pub String);
