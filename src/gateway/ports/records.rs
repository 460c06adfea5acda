//! Append-only store for execution records.

use crate::gateway::domain::{EndpointId, ExecutionId, ExecutionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for record store operations.
pub type RecordResult<T> = Result<T, RecordStoreError>;

/// Persistence contract for execution records.
#[async_trait]
pub trait ExecutionRecordRepository: Send + Sync {
    /// Appends a terminal record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::DuplicateRecord`] when the identifier was
    /// already appended.
    async fn append(&self, record: &ExecutionRecord) -> RecordResult<()>;

    /// Lists an endpoint's records started within `[from, to)`, in append
    /// order.
    async fn list_by_endpoint(
        &self,
        endpoint_id: EndpointId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RecordResult<Vec<ExecutionRecord>>;

    /// Lists one execution's records in append order.
    async fn list_by_execution(
        &self,
        execution_id: ExecutionId,
    ) -> RecordResult<Vec<ExecutionRecord>>;

    /// Removes records started before `cutoff`, returning the removed count.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> RecordResult<usize>;
}

/// Errors returned by record store implementations.
#[derive(Debug, Clone, Error)]
pub enum RecordStoreError {
    /// The record was already appended.
    #[error("execution record already appended: {0}")]
    DuplicateRecord(String),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl RecordStoreError {
    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
