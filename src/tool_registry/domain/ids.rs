//! Identifier and validated-name types for tool servers and catalog entries.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length for a tool server name, matching `VARCHAR(100)`.
const MAX_SERVER_NAME_LENGTH: usize = 100;

/// Unique identifier for a tool server registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(Uuid);

impl ServerId {
    /// Creates a new random server identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a server identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Uuid> for ServerId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Unique identifier for a catalog entry (one discovered tool on one server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogEntryId(Uuid);

impl CatalogEntryId {
    /// Creates a new random catalog entry identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a catalog entry identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CatalogEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CatalogEntryId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated tool server name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(String);

impl ServerName {
    /// Creates a validated server name.
    ///
    /// The input is trimmed and lowercased. Only characters in `[a-z0-9_]`
    /// are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyServerName);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        });
        if !is_valid {
            return Err(ToolRegistryDomainError::InvalidServerName(normalized));
        }

        if normalized.len() > MAX_SERVER_NAME_LENGTH {
            return Err(ToolRegistryDomainError::ServerNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the server name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn server_name_is_normalized() {
        let name = ServerName::new("  Weather_Tools ").expect("valid name");
        assert_eq!(name.as_str(), "weather_tools");
    }

    #[rstest]
    #[case("", ToolRegistryDomainError::EmptyServerName)]
    #[case("weather-tools", ToolRegistryDomainError::InvalidServerName("weather-tools".to_owned()))]
    fn server_name_rejects_invalid_input(
        #[case] raw: &str,
        #[case] expected: ToolRegistryDomainError,
    ) {
        assert_eq!(ServerName::new(raw), Err(expected));
    }

    #[test]
    fn server_name_rejects_overlong_input() {
        let raw = "a".repeat(MAX_SERVER_NAME_LENGTH + 1);
        assert!(matches!(
            ServerName::new(raw),
            Err(ToolRegistryDomainError::ServerNameTooLong(_))
        ));
    }
}
