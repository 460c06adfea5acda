//! Repository port for tool server registry persistence.

use crate::tool_registry::domain::{ServerHealthSnapshot, ServerId, ServerName, ToolServer};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for server registry operations.
pub type ServerRegistryResult<T> = Result<T, ServerRegistryError>;

/// Persistence contract for tool server registrations.
#[async_trait]
pub trait ServerRepository: Send + Sync {
    /// Stores a new server registration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::DuplicateServer`] when the ID already
    /// exists, [`ServerRegistryError::DuplicateServerName`] when the name is
    /// taken or [`ServerRegistryError::DuplicateServerAddress`] when another
    /// server already uses the same address.
    async fn register(&self, server: &ToolServer) -> ServerRegistryResult<()>;

    /// Persists updates to an existing registration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] when the server does not
    /// exist.
    async fn update(&self, server: &ToolServer) -> ServerRegistryResult<()>;

    /// Stores a health check result without touching any other field.
    ///
    /// The snapshot is only written while the server is active; an inactive
    /// server keeps the health its deactivation set. Returns the stored
    /// registration after the write.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] when the server does not
    /// exist.
    async fn update_health(
        &self,
        server_id: ServerId,
        snapshot: &ServerHealthSnapshot,
    ) -> ServerRegistryResult<ToolServer>;

    /// Removes a registration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryError::NotFound`] when the server does not
    /// exist.
    async fn remove(&self, server_id: ServerId) -> ServerRegistryResult<()>;

    /// Finds a registration by internal identifier.
    async fn find_by_id(&self, server_id: ServerId) -> ServerRegistryResult<Option<ToolServer>>;

    /// Finds a registration by unique server name.
    async fn find_by_name(
        &self,
        server_name: &ServerName,
    ) -> ServerRegistryResult<Option<ToolServer>>;

    /// Returns all registrations regardless of state.
    async fn list_all(&self) -> ServerRegistryResult<Vec<ToolServer>>;
}

/// Errors returned by server repository implementations.
#[derive(Debug, Clone, Error)]
pub enum ServerRegistryError {
    /// A server with the same identifier already exists.
    #[error("duplicate tool server identifier: {0}")]
    DuplicateServer(ServerId),

    /// A server with the same name already exists.
    #[error("duplicate tool server name: {0}")]
    DuplicateServerName(ServerName),

    /// A server with the same address already exists.
    #[error("duplicate tool server address: {0}")]
    DuplicateServerAddress(String),

    /// The server was not found.
    #[error("tool server not found: {0}")]
    NotFound(ServerId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted tool server data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ServerRegistryError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
