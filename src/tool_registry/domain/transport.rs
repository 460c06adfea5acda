//! Tool server transport configuration value objects.

use super::{ParseTransportKindError, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transport settings for a tool server hosted as a local child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPipeConfig {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl ProcessPipeConfig {
    /// Creates a new process-pipe transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyProcessCommand`] when
    /// `command` is empty after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(ToolRegistryDomainError::EmptyProcessCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Transport settings for a tool server reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    url: String,
}

impl HttpTransportConfig {
    /// Creates a new HTTP transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when `url` is empty or does not
    /// start with `http://` or `https://`.
    pub fn new(url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_url = url.into().trim().trim_end_matches('/').to_owned();
        if normalized_url.is_empty() {
            return Err(ToolRegistryDomainError::EmptyTransportUrl);
        }

        let has_valid_prefix =
            normalized_url.starts_with("http://") || normalized_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(ToolRegistryDomainError::InvalidTransportUrl(normalized_url));
        }

        Ok(Self {
            url: normalized_url,
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Discriminant of [`ServerTransport`], used for routing and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// One HTTP request, one JSON response.
    RequestResponse,
    /// HTTP request answered with a server-sent event stream.
    ServerPushStream,
    /// Newline-delimited messages over a child process's stdio.
    ProcessPipe,
}

impl TransportKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestResponse => "request_response",
            Self::ServerPushStream => "server_push_stream",
            Self::ProcessPipe => "process_pipe",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ParseTransportKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "request_response" => Ok(Self::RequestResponse),
            "server_push_stream" => Ok(Self::ServerPushStream),
            "process_pipe" => Ok(Self::ProcessPipe),
            _ => Err(ParseTransportKindError(value.to_owned())),
        }
    }
}

/// Supported transport configuration variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum ServerTransport {
    /// JSON-RPC over plain HTTP request/response.
    RequestResponse(HttpTransportConfig),
    /// JSON-RPC over HTTP with server-sent event replies.
    ServerPushStream(HttpTransportConfig),
    /// JSON-RPC over a child process's stdin/stdout.
    ProcessPipe(ProcessPipeConfig),
}

impl ServerTransport {
    /// Creates a `request_response` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`HttpTransportConfig::new`].
    pub fn request_response(url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::RequestResponse(HttpTransportConfig::new(url)?))
    }

    /// Creates a `server_push_stream` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`HttpTransportConfig::new`].
    pub fn server_push_stream(url: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::ServerPushStream(HttpTransportConfig::new(url)?))
    }

    /// Creates a `process_pipe` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`ProcessPipeConfig::new`].
    pub fn process_pipe(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::ProcessPipe(ProcessPipeConfig::new(command)?))
    }

    /// Returns the transport discriminant.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::RequestResponse(_) => TransportKind::RequestResponse,
            Self::ServerPushStream(_) => TransportKind::ServerPushStream,
            Self::ProcessPipe(_) => TransportKind::ProcessPipe,
        }
    }

    /// Returns the address used for uniqueness checks.
    ///
    /// HTTP transports use their URL; process pipes use the command line.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::RequestResponse(config) | Self::ServerPushStream(config) => {
                config.url().to_owned()
            }
            Self::ProcessPipe(config) => std::iter::once(config.command())
                .chain(config.args().iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}
