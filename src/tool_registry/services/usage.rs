//! Usage accumulation for catalog entries.

use crate::tool_registry::{
    domain::{CatalogEntryId, ToolRegistryDomainError, UsageSample, UsageStats},
    ports::{CatalogError, CatalogRepository},
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while recording usage.
#[derive(Debug, Error)]
pub enum UsageError {
    /// The sample was invalid.
    #[error(transparent)]
    Domain(#[from] ToolRegistryDomainError),
    /// The catalog rejected the update.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Folds invocation outcomes into catalog entry statistics.
///
/// Updates are linearizable per entry; the repository serializes concurrent
/// samples for the same entry without a global lock.
pub struct UsageAccumulator<K: CatalogRepository> {
    catalog: Arc<K>,
}

impl<K: CatalogRepository> Clone for UsageAccumulator<K> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<K: CatalogRepository> UsageAccumulator<K> {
    /// Creates an accumulator writing to `catalog`.
    #[must_use]
    pub const fn new(catalog: Arc<K>) -> Self {
        Self { catalog }
    }

    /// Records one invocation outcome.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::Domain`] for invalid latencies and
    /// [`UsageError::Catalog`] when the entry is missing or persistence
    /// fails.
    pub async fn record(
        &self,
        entry_id: CatalogEntryId,
        latency_ms: f64,
        success: bool,
    ) -> Result<UsageStats, UsageError> {
        let sample = UsageSample::new(latency_ms, success)?;
        Ok(self.catalog.record_usage(entry_id, sample).await?)
    }

    /// Records an outcome measured as a [`Duration`].
    ///
    /// # Errors
    ///
    /// See [`UsageAccumulator::record`].
    pub async fn record_elapsed(
        &self,
        entry_id: CatalogEntryId,
        elapsed: Duration,
        success: bool,
    ) -> Result<UsageStats, UsageError> {
        self.record(entry_id, elapsed.as_secs_f64() * 1_000.0, success)
            .await
    }
}
