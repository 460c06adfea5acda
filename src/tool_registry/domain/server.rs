//! Tool server registration aggregate root.

use super::{
    AuthConfig, ServerHealthSnapshot, ServerHealthStatus, ServerId, ServerName, ServerTransport,
    ToolRegistryDomainError,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Registered tool-provider server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServer {
    id: ServerId,
    name: ServerName,
    transport: ServerTransport,
    auth: AuthConfig,
    capabilities: Vec<String>,
    health: ServerHealthSnapshot,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing persisted server state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedToolServerData {
    /// Persisted server identifier.
    pub id: ServerId,
    /// Persisted server name.
    pub name: ServerName,
    /// Persisted transport settings.
    pub transport: ServerTransport,
    /// Persisted credentials.
    pub auth: AuthConfig,
    /// Persisted declared capabilities.
    pub capabilities: Vec<String>,
    /// Persisted last health snapshot.
    pub health: ServerHealthSnapshot,
    /// Persisted active flag.
    pub active: bool,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ToolServer {
    /// Creates a new, active server registration with `unknown` health.
    #[must_use]
    pub fn new(name: ServerName, transport: ServerTransport, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: ServerId::new(),
            name,
            transport,
            auth: AuthConfig::None,
            capabilities: Vec::new(),
            health: ServerHealthSnapshot::unknown(timestamp),
            active: true,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Declares server capabilities.
    ///
    /// Tags are trimmed, lowercased and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyCapability`] when a tag is
    /// blank.
    pub fn with_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        self.capabilities = normalize_capabilities(capabilities)?;
        Ok(self)
    }

    /// Reconstructs a registration from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedToolServerData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            transport: data.transport,
            auth: data.auth,
            capabilities: data.capabilities,
            health: data.health,
            active: data.active,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> ServerId {
        self.id
    }

    /// Returns the validated server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &ServerTransport {
        &self.transport
    }

    /// Returns the base address used for uniqueness checks.
    #[must_use]
    pub fn address(&self) -> String {
        self.transport.address()
    }

    /// Returns the credentials.
    #[must_use]
    pub const fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// Returns declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns the latest health snapshot.
    #[must_use]
    pub const fn health(&self) -> &ServerHealthSnapshot {
        &self.health
    }

    /// Returns whether the server participates in health checks and routing.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns whether the execution engine may route calls to this server.
    #[must_use]
    pub const fn accepts_calls(&self) -> bool {
        self.active && self.health.status().accepts_calls()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Stores a new health snapshot.
    ///
    /// Health belongs to the health monitor and leaves `updated_at`, which tracks
    /// operator changes, untouched.
    pub fn update_health(&mut self, health_snapshot: ServerHealthSnapshot) {
        self.health = health_snapshot;
    }

    /// Activates or deactivates the server.
    ///
    /// Deactivation resets health to `unknown` because the monitor stops
    /// probing inactive servers.
    pub fn set_active(&mut self, active: bool, clock: &impl Clock) {
        if self.active == active {
            return;
        }
        self.active = active;
        if !active {
            self.health = ServerHealthSnapshot::unknown(clock.utc());
        }
        self.touch(clock);
    }

    /// Validates that discovery and probing are allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::ServerInactive`] for inactive
    /// servers.
    pub const fn ensure_active(&self) -> Result<(), ToolRegistryDomainError> {
        if self.active {
            return Ok(());
        }
        Err(ToolRegistryDomainError::ServerInactive(self.id))
    }

    /// Returns whether the last probe reported the server unhealthy.
    #[must_use]
    pub fn is_unhealthy(&self) -> bool {
        self.health.status() == ServerHealthStatus::Unhealthy
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}

pub(crate) fn normalize_capabilities(
    capabilities: impl IntoIterator<Item = String>,
) -> Result<Vec<String>, ToolRegistryDomainError> {
    let mut normalized = Vec::new();
    for capability in capabilities {
        let tag = capability.trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(ToolRegistryDomainError::EmptyCapability);
        }
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    Ok(normalized)
}
