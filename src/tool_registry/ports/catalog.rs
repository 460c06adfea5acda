//! Repository port for the tool catalog.

use crate::tool_registry::domain::{
    CatalogEntry, CatalogEntryId, ServerId, UsageSample, UsageStats,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog repository operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Persistence contract for catalog entries.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Inserts a new entry or replaces the metadata of an existing one.
    ///
    /// Statistics stored for an existing entry are preserved; only
    /// [`CatalogRepository::record_usage`] changes them.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateTool`] when a different entry already
    /// owns the same server/tool pair.
    async fn upsert(&self, entry: &CatalogEntry) -> CatalogResult<()>;

    /// Finds an entry by identifier.
    async fn find_by_id(&self, entry_id: CatalogEntryId) -> CatalogResult<Option<CatalogEntry>>;

    /// Finds an entry by owning server and tool name.
    async fn find_by_tool(
        &self,
        server_id: ServerId,
        tool_name: &str,
    ) -> CatalogResult<Option<CatalogEntry>>;

    /// Lists every entry owned by a server, available or not.
    async fn list_for_server(&self, server_id: ServerId) -> CatalogResult<Vec<CatalogEntry>>;

    /// Removes every entry owned by a server, returning the removed count.
    async fn remove_for_server(&self, server_id: ServerId) -> CatalogResult<usize>;

    /// Atomically folds a usage sample into an entry's statistics.
    ///
    /// Implementations must serialize concurrent calls per entry so that no
    /// update is lost.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when the entry does not exist.
    async fn record_usage(
        &self,
        entry_id: CatalogEntryId,
        sample: UsageSample,
    ) -> CatalogResult<UsageStats>;
}

/// Errors returned by catalog repository implementations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Another entry already exists for the same server and tool name.
    #[error("tool '{tool_name}' is already cataloged for server {server_id}")]
    DuplicateTool {
        /// Owning server.
        server_id: ServerId,
        /// Tool name.
        tool_name: String,
    },

    /// The entry was not found.
    #[error("catalog entry not found: {0}")]
    NotFound(CatalogEntryId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted catalog data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CatalogError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
