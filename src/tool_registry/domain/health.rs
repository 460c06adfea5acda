//! Tool server health status domain types.

use super::ParseServerHealthStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health status of a tool-provider server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerHealthStatus {
    /// Health has not been checked yet.
    Unknown,
    /// Server is reachable and healthy.
    Healthy,
    /// Server answers but slowly or partially.
    Degraded,
    /// Server is unreachable or reports itself unhealthy.
    Unhealthy,
}

impl ServerHealthStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Returns whether calls routed to a server in this state may proceed.
    ///
    /// Only `unhealthy` servers are short-circuited; `unknown` servers have
    /// simply not been probed yet.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        !matches!(self, Self::Unhealthy)
    }
}

impl fmt::Display for ServerHealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServerHealthStatus {
    type Error = ParseServerHealthStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "unknown" => Ok(Self::Unknown),
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "unhealthy" => Ok(Self::Unhealthy),
            _ => Err(ParseServerHealthStatusError(value.to_owned())),
        }
    }
}

/// Timestamped health snapshot for a tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHealthSnapshot {
    status: ServerHealthStatus,
    checked_at: DateTime<Utc>,
    message: Option<String>,
}

impl ServerHealthSnapshot {
    /// Creates a health snapshot.
    #[must_use]
    pub const fn new(status: ServerHealthStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            status,
            checked_at,
            message: None,
        }
    }

    /// Creates an `unknown` health snapshot.
    #[must_use]
    pub const fn unknown(checked_at: DateTime<Utc>) -> Self {
        Self::new(ServerHealthStatus::Unknown, checked_at)
    }

    /// Creates a `healthy` health snapshot.
    #[must_use]
    pub const fn healthy(checked_at: DateTime<Utc>) -> Self {
        Self::new(ServerHealthStatus::Healthy, checked_at)
    }

    /// Creates a `degraded` health snapshot with details.
    #[must_use]
    pub fn degraded(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(ServerHealthStatus::Degraded, checked_at).with_message(message)
    }

    /// Creates an `unhealthy` health snapshot with details.
    #[must_use]
    pub fn unhealthy(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(ServerHealthStatus::Unhealthy, checked_at).with_message(message)
    }

    /// Adds an explanatory message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let normalized = message.into().trim().to_owned();
        if !normalized.is_empty() {
            self.message = Some(normalized);
        }
        self
    }

    /// Returns the health status.
    #[must_use]
    pub const fn status(&self) -> ServerHealthStatus {
        self.status
    }

    /// Returns the health check timestamp.
    #[must_use]
    pub const fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Returns an optional health detail message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
