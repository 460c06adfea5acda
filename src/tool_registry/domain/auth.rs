//! Credential configuration attached to a tool server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Credentials applied by transports when talking to a tool server.
///
/// The gateway never inspects the values; transports attach them as HTTP
/// headers or child-process environment variables.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scheme")]
pub enum AuthConfig {
    /// No credentials.
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer {
        /// Bearer token.
        token: String,
    },
    /// Arbitrary request headers.
    Headers {
        /// Header name/value pairs.
        headers: BTreeMap<String, String>,
    },
    /// Environment variables injected into a process-pipe server.
    Environment {
        /// Variable name/value pairs.
        vars: BTreeMap<String, String>,
    },
}

impl AuthConfig {
    /// Returns HTTP headers carrying these credentials.
    #[must_use]
    pub fn http_headers(&self) -> Vec<(String, String)> {
        match self {
            Self::Bearer { token } => {
                vec![("authorization".to_owned(), format!("Bearer {token}"))]
            }
            Self::Headers { headers } => headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            Self::None | Self::Environment { .. } => Vec::new(),
        }
    }

    /// Returns environment variables carrying these credentials.
    #[must_use]
    pub fn environment(&self) -> Vec<(String, String)> {
        match self {
            Self::Environment { vars } => vars
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            Self::None | Self::Bearer { .. } | Self::Headers { .. } => Vec::new(),
        }
    }

    const fn scheme(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bearer { .. } => "bearer",
            Self::Headers { .. } => "headers",
            Self::Environment { .. } => "environment",
        }
    }
}

/// Secrets are redacted from debug output.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthConfig")
            .field("scheme", &self.scheme())
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_becomes_authorization_header() {
        let auth = AuthConfig::Bearer {
            token: "s3cret".to_owned(),
        };
        assert_eq!(
            auth.http_headers(),
            vec![("authorization".to_owned(), "Bearer s3cret".to_owned())]
        );
        assert!(auth.environment().is_empty());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let auth = AuthConfig::Bearer {
            token: "s3cret".to_owned(),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("s3cret"));
    }
}
