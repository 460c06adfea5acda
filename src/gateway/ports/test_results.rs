//! Store for tool test runs.

use super::RecordStoreError;
use crate::gateway::domain::TestResult;
use crate::tool_registry::domain::CatalogEntryId;
use async_trait::async_trait;

/// Persistence contract for test results.
#[async_trait]
pub trait TestResultRepository: Send + Sync {
    /// Stores a finished run.
    async fn store(&self, result: &TestResult) -> Result<(), RecordStoreError>;

    /// Lists runs for an entry, oldest first.
    async fn list_for_entry(
        &self,
        entry_id: CatalogEntryId,
    ) -> Result<Vec<TestResult>, RecordStoreError>;
}
