//! In-memory stores for execution records and test results.

use crate::gateway::{
    domain::{EndpointId, ExecutionId, ExecutionRecord, TestResult},
    ports::{ExecutionRecordRepository, RecordResult, RecordStoreError, TestResultRepository},
};
use crate::tool_registry::domain::CatalogEntryId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

/// Append-only in-memory execution record log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl InMemoryRecordStore {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(
        &self,
        keep: impl Fn(&ExecutionRecord) -> bool,
    ) -> RecordResult<Vec<ExecutionRecord>> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(records.iter().filter(|record| keep(record)).cloned().collect())
    }
}

fn lock_error(err: impl ToString) -> RecordStoreError {
    RecordStoreError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ExecutionRecordRepository for InMemoryRecordStore {
    async fn append(&self, record: &ExecutionRecord) -> RecordResult<()> {
        let mut records = self.records.write().map_err(lock_error)?;
        if records.iter().any(|existing| existing.id() == record.id()) {
            return Err(RecordStoreError::DuplicateRecord(record.id().to_string()));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn list_by_endpoint(
        &self,
        endpoint_id: EndpointId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RecordResult<Vec<ExecutionRecord>> {
        self.filtered(|record| {
            record.endpoint_id() == endpoint_id
                && record.started_at() >= from
                && record.started_at() < to
        })
    }

    async fn list_by_execution(
        &self,
        execution_id: ExecutionId,
    ) -> RecordResult<Vec<ExecutionRecord>> {
        self.filtered(|record| record.execution_id() == execution_id)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> RecordResult<usize> {
        let mut records = self.records.write().map_err(lock_error)?;
        let before = records.len();
        records.retain(|record| record.started_at() >= cutoff);
        Ok(before.saturating_sub(records.len()))
    }
}

/// In-memory test result store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTestResults {
    results: Arc<RwLock<Vec<TestResult>>>,
}

impl InMemoryTestResults {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestResultRepository for InMemoryTestResults {
    async fn store(&self, result: &TestResult) -> Result<(), RecordStoreError> {
        self.results
            .write()
            .map_err(lock_error)?
            .push(result.clone());
        Ok(())
    }

    async fn list_for_entry(
        &self,
        entry_id: CatalogEntryId,
    ) -> Result<Vec<TestResult>, RecordStoreError> {
        let results = self.results.read().map_err(lock_error)?;
        Ok(results
            .iter()
            .filter(|result| result.entry_id == entry_id)
            .cloned()
            .collect())
    }
}
