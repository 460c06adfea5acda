//! Read access to execution records and retention pruning.

use crate::gateway::{
    domain::{EndpointId, ExecutionId, ExecutionRecord},
    ports::{ExecutionRecordRepository, RecordResult},
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::sync::Arc;
use tracing::info;

/// Queries and prunes the execution record log.
pub struct RecordQueryService<R, C>
where
    R: ExecutionRecordRepository,
    C: Clock + Send + Sync,
{
    records: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> Clone for RecordQueryService<R, C>
where
    R: ExecutionRecordRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, C> RecordQueryService<R, C>
where
    R: ExecutionRecordRepository,
    C: Clock + Send + Sync,
{
    /// Creates a query service.
    #[must_use]
    pub const fn new(records: Arc<R>, clock: Arc<C>) -> Self {
        Self { records, clock }
    }

    /// Lists an endpoint's records started within `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns persistence errors.
    pub async fn list_by_endpoint(
        &self,
        endpoint_id: EndpointId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RecordResult<Vec<ExecutionRecord>> {
        self.records.list_by_endpoint(endpoint_id, from, to).await
    }

    /// Lists every attempt of one execution.
    ///
    /// # Errors
    ///
    /// Returns persistence errors.
    pub async fn list_by_execution(
        &self,
        execution_id: ExecutionId,
    ) -> RecordResult<Vec<ExecutionRecord>> {
        self.records.list_by_execution(execution_id).await
    }

    /// Removes records started more than `retention_days` ago.
    ///
    /// # Errors
    ///
    /// Returns persistence errors.
    pub async fn prune_older_than(&self, retention_days: u32) -> RecordResult<usize> {
        let cutoff = self.clock.utc() - TimeDelta::days(i64::from(retention_days));
        let removed = self.records.prune_before(cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "pruned execution records");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::adapters::memory::InMemoryRecordStore;
    use crate::gateway::domain::{BindingId, RecordScope, new_trace_id};
    use crate::tool_registry::domain::ServerId;
    use chrono::Local;
    use serde_json::json;

    fn scope(execution_id: ExecutionId, endpoint_id: EndpointId) -> RecordScope {
        RecordScope {
            execution_id,
            endpoint_id,
            binding_id: BindingId::new(),
            server_id: ServerId::new(),
            tool_name: "geocode".to_owned(),
            trace_id: new_trace_id(),
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn local(&self) -> DateTime<Local> {
            self.0.with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            self.0
        }
    }

    const fn clock_at(at: DateTime<Utc>) -> FixedClock {
        FixedClock(at)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn prune_keeps_records_inside_retention() {
        let now = Utc::now();
        let store = Arc::new(InMemoryRecordStore::new());
        let endpoint_id = EndpointId::new();
        let old = ExecutionRecord::skipped(
            &scope(ExecutionId::new(), endpoint_id),
            &clock_at(now - TimeDelta::days(10)),
        );
        let recent = ExecutionRecord::skipped(
            &scope(ExecutionId::new(), endpoint_id),
            &clock_at(now - TimeDelta::days(1)),
        );
        store.append(&old).await.expect("append old");
        store.append(&recent).await.expect("append recent");
        let service = RecordQueryService::new(Arc::clone(&store), Arc::new(clock_at(now)));

        let removed = service.prune_older_than(7).await.expect("prune succeeds");

        assert_eq!(removed, 1);
        let remaining = service
            .list_by_endpoint(endpoint_id, now - TimeDelta::days(30), now)
            .await
            .expect("list succeeds");
        assert_eq!(remaining, vec![recent]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn execution_records_come_back_in_append_order() {
        let now = Utc::now();
        let clock = clock_at(now);
        let store = Arc::new(InMemoryRecordStore::new());
        let execution_id = ExecutionId::new();
        let scope = scope(execution_id, EndpointId::new());
        let first = ExecutionRecord::start(&scope, 1, json!({}), &clock);
        let second = ExecutionRecord::start(&scope, 2, json!({}), &clock);
        store.append(&first).await.expect("append first");
        store.append(&second).await.expect("append second");
        let service = RecordQueryService::new(store, Arc::new(clock));

        let records = service
            .list_by_execution(execution_id)
            .await
            .expect("list succeeds");

        let attempts: Vec<_> = records.iter().map(ExecutionRecord::attempt).collect();
        assert_eq!(attempts, [1, 2]);
    }
}
