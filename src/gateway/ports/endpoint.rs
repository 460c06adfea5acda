//! Repository port for endpoint definitions.

use crate::gateway::domain::{Endpoint, EndpointId, EndpointUsage, ExecutionStatus};
use chrono::{DateTime, Utc};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for endpoint repository operations.
pub type EndpointResult<T> = Result<T, EndpointRepositoryError>;

/// Persistence contract for endpoints and their bindings.
///
/// Endpoints are stored and loaded whole; readers receive independent
/// snapshots that later edits do not affect.
#[async_trait]
pub trait EndpointRepository: Send + Sync {
    /// Stores a new endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointRepositoryError::DuplicateName`] or
    /// [`EndpointRepositoryError::DuplicatePath`] when another endpoint owns
    /// the same name or path.
    async fn create(&self, endpoint: &Endpoint) -> EndpointResult<()>;

    /// Replaces a stored endpoint's definition.
    ///
    /// Usage analytics already stored are preserved; only
    /// [`EndpointRepository::record_invocation`] changes them.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointRepositoryError::NotFound`] when the endpoint does
    /// not exist.
    async fn update(&self, endpoint: &Endpoint) -> EndpointResult<()>;

    /// Finds an endpoint by identifier.
    async fn find_by_id(&self, endpoint_id: EndpointId) -> EndpointResult<Option<Endpoint>>;

    /// Finds an endpoint by normalized path.
    async fn find_by_path(&self, path: &str) -> EndpointResult<Option<Endpoint>>;

    /// Finds an endpoint by name.
    async fn find_by_name(&self, name: &str) -> EndpointResult<Option<Endpoint>>;

    /// Lists every endpoint ordered by name.
    async fn list_all(&self) -> EndpointResult<Vec<Endpoint>>;

    /// Atomically folds one invocation into an endpoint's usage analytics.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointRepositoryError::NotFound`] when the endpoint does
    /// not exist.
    async fn record_invocation(
        &self,
        endpoint_id: EndpointId,
        status: ExecutionStatus,
        latency_ms: u64,
        at: DateTime<Utc>,
    ) -> EndpointResult<EndpointUsage>;
}

/// Errors returned by endpoint repository implementations.
#[derive(Debug, Clone, Error)]
pub enum EndpointRepositoryError {
    /// Another endpoint already uses the name.
    #[error("endpoint name '{0}' is already in use")]
    DuplicateName(String),

    /// Another endpoint already uses the path.
    #[error("endpoint path '{0}' is already in use")]
    DuplicatePath(String),

    /// The endpoint was not found.
    #[error("endpoint not found: {0}")]
    NotFound(EndpointId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl EndpointRepositoryError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
