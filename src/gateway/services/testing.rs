//! Ad-hoc test runs against a single catalog entry.

use crate::gateway::{
    domain::{AssertionResult, TestCase, TestResult, TestResultId, TestStatus},
    ports::{RecordStoreError, TestResultRepository},
};
use crate::tool_registry::{
    domain::{CatalogEntry, CatalogEntryId},
    ports::{CatalogError, CatalogRepository, ServerRegistryError, ServerRepository, ToolCall, ToolTransport},
};
use mockable::Clock;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Service-level errors for test runs.
#[derive(Debug, Error)]
pub enum ToolTestError {
    /// No catalog entry exists with the given identifier.
    #[error("catalog entry {0} not found")]
    EntryNotFound(CatalogEntryId),
    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Server lookup failed.
    #[error(transparent)]
    Servers(#[from] ServerRegistryError),
    /// The result could not be stored.
    #[error(transparent)]
    Store(#[from] RecordStoreError),
}

/// Result type for test runs.
pub type ToolTestResult<T> = Result<T, ToolTestError>;

/// Invokes catalog tools outside any endpoint and checks their output.
///
/// Test calls never feed the catalog's usage statistics.
pub struct ToolTestService<S, K, T, R, C>
where
    S: ServerRepository,
    K: CatalogRepository,
    T: ToolTransport,
    R: TestResultRepository,
    C: Clock + Send + Sync,
{
    servers: Arc<S>,
    catalog: Arc<K>,
    transport: Arc<T>,
    results: Arc<R>,
    clock: Arc<C>,
    timeout: Duration,
}

impl<S, K, T, R, C> Clone for ToolTestService<S, K, T, R, C>
where
    S: ServerRepository,
    K: CatalogRepository,
    T: ToolTransport,
    R: TestResultRepository,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            servers: Arc::clone(&self.servers),
            catalog: Arc::clone(&self.catalog),
            transport: Arc::clone(&self.transport),
            results: Arc::clone(&self.results),
            clock: Arc::clone(&self.clock),
            timeout: self.timeout,
        }
    }
}

/// What the tool call produced.
enum CallResult {
    Output(Value, Duration),
    Error(String, Duration),
}

impl<S, K, T, R, C> ToolTestService<S, K, T, R, C>
where
    S: ServerRepository,
    K: CatalogRepository,
    T: ToolTransport,
    R: TestResultRepository,
    C: Clock + Send + Sync,
{
    /// Creates a test service with a 10 second call timeout.
    #[must_use]
    pub const fn new(
        servers: Arc<S>,
        catalog: Arc<K>,
        transport: Arc<T>,
        results: Arc<R>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            servers,
            catalog,
            transport,
            results,
            clock,
            timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    /// Overrides the call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs one test case and stores its result.
    ///
    /// Transport failures produce a stored result with status `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolTestError::EntryNotFound`] for unknown entries, and
    /// lookup or storage errors.
    pub async fn run(&self, entry_id: CatalogEntryId, case: &TestCase) -> ToolTestResult<TestResult> {
        let entry = self
            .catalog
            .find_by_id(entry_id)
            .await?
            .ok_or(ToolTestError::EntryNotFound(entry_id))?;

        let mut result = TestResult {
            id: TestResultId::new(),
            entry_id,
            test_name: case.name().to_owned(),
            input: case.input().clone(),
            expected: case.expected().cloned(),
            actual: None,
            status: TestStatus::Running,
            assertions: Vec::new(),
            latency_ms: 0,
            error: None,
            created_at: self.clock.utc(),
        };

        match self.call(&entry, case.input()).await? {
            CallResult::Output(actual, elapsed) => {
                result.latency_ms = millis(elapsed);
                result.assertions = check_assertions(case, &actual);
                let matches_expected = case.expected().is_none_or(|expected| *expected == actual);
                result.status = if matches_expected
                    && result.assertions.iter().all(|assertion| assertion.passed)
                {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
                result.actual = Some(actual);
            }
            CallResult::Error(message, elapsed) => {
                warn!(%entry_id, tool = entry.tool_name(), error = %message, "test call failed");
                result.latency_ms = millis(elapsed);
                result.status = TestStatus::Error;
                result.error = Some(message);
            }
        }

        self.results.store(&result).await?;
        info!(
            %entry_id,
            test = %result.test_name,
            status = result.status.as_str(),
            latency_ms = result.latency_ms,
            "tool test finished"
        );
        Ok(result)
    }

    /// Lists stored runs for an entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_for_entry(&self, entry_id: CatalogEntryId) -> ToolTestResult<Vec<TestResult>> {
        Ok(self.results.list_for_entry(entry_id).await?)
    }

    async fn call(&self, entry: &CatalogEntry, input: &Value) -> ToolTestResult<CallResult> {
        let Some(server) = self.servers.find_by_id(entry.server_id()).await? else {
            return Ok(CallResult::Error(
                format!("tool server {} is not registered", entry.server_id()),
                Duration::ZERO,
            ));
        };
        if !server.accepts_calls() {
            return Ok(CallResult::Error(
                format!("tool server '{}' does not accept calls", server.name()),
                Duration::ZERO,
            ));
        }

        let call = ToolCall::new(
            format!("test:{}", TestResultId::new()),
            entry.tool_name(),
            input.clone(),
            self.timeout,
        );
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.transport.invoke(&server, &call)).await;
        let elapsed = started.elapsed();
        Ok(match outcome {
            Ok(Ok(output)) => CallResult::Output(output.content, elapsed),
            Ok(Err(err)) => CallResult::Error(err.to_string(), elapsed),
            Err(_) => {
                if let Err(err) = self.transport.cancel(&server, &call.call_id).await {
                    warn!(call_id = %call.call_id, error = %err, "cancellation not delivered");
                }
                CallResult::Error(
                    format!("no reply within {} ms", self.timeout.as_millis()),
                    elapsed,
                )
            }
        })
    }
}

fn check_assertions(case: &TestCase, actual: &Value) -> Vec<AssertionResult> {
    let context = json!({ "input": case.input(), "output": actual });
    case.assertions()
        .iter()
        .map(|assertion| match assertion.evaluate_condition(&context) {
            Ok(passed) => AssertionResult {
                expression: assertion.source().to_owned(),
                passed,
                error: None,
            },
            Err(err) => AssertionResult {
                expression: assertion.source().to_owned(),
                passed: false,
                error: Some(err.to_string()),
            },
        })
        .collect()
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::adapters::memory::InMemoryTestResults;
    use crate::gateway::domain::Expression;
    use crate::tool_registry::adapters::memory::{InMemoryCatalog, InMemoryServerRegistry};
    use crate::tool_registry::adapters::{ScriptedResponse, ScriptedToolTransport};
    use crate::tool_registry::domain::{
        ServerHealthSnapshot, ServerName, ServerTransport, ToolDefinition, ToolServer,
    };
    use mockable::DefaultClock;
    use rstest::rstest;

    type Service = ToolTestService<
        InMemoryServerRegistry,
        InMemoryCatalog,
        ScriptedToolTransport,
        InMemoryTestResults,
        DefaultClock,
    >;

    struct Harness {
        service: Service,
        servers: Arc<InMemoryServerRegistry>,
        catalog: Arc<InMemoryCatalog>,
        transport: Arc<ScriptedToolTransport>,
        server: ToolServer,
        entry: CatalogEntry,
    }

    async fn harness() -> Harness {
        let clock = DefaultClock;
        let server = ToolServer::new(
            ServerName::new("weather_tools").expect("valid name"),
            ServerTransport::request_response("http://localhost:9000/rpc").expect("valid url"),
            &clock,
        );
        let servers = Arc::new(InMemoryServerRegistry::new());
        servers.register(&server).await.expect("server registered");
        let catalog = Arc::new(InMemoryCatalog::new());
        let definition = ToolDefinition::new("geocode", json!({})).expect("valid definition");
        let entry = CatalogEntry::discovered(server.id(), &definition, &clock);
        catalog.upsert(&entry).await.expect("entry stored");
        let transport = Arc::new(ScriptedToolTransport::new());
        let service = ToolTestService::new(
            Arc::clone(&servers),
            Arc::clone(&catalog),
            Arc::clone(&transport),
            Arc::new(InMemoryTestResults::new()),
            Arc::new(clock),
        );
        Harness {
            service,
            servers,
            catalog,
            transport,
            server,
            entry,
        }
    }

    fn assertion(source: &str) -> Expression {
        Expression::parse_condition(source).expect("valid assertion")
    }

    #[rstest]
    #[case(json!({"lat": 48.85}), "output.lat > 40", TestStatus::Passed)]
    #[case(json!({"lat": 10.0}), "output.lat > 40", TestStatus::Failed)]
    #[case(json!({"lat": 48.85}), "output.lat == input.lat", TestStatus::Failed)]
    #[tokio::test(flavor = "multi_thread")]
    async fn assertions_decide_status(
        #[case] reply: Value,
        #[case] check: &str,
        #[case] expected: TestStatus,
    ) {
        let h = harness().await;
        h.transport
            .push_response("geocode", ScriptedResponse::Success(reply))
            .expect("response queued");
        let case = TestCase::new("paris", json!({"city": "Paris"})).asserting(assertion(check));

        let result = h.service.run(h.entry.id(), &case).await.expect("test runs");

        assert_eq!(result.status, expected);
        assert_eq!(result.assertions.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expected_output_requires_exact_equality() {
        let h = harness().await;
        h.transport
            .push_response("geocode", ScriptedResponse::Success(json!({"lat": 48.85, "lon": 2.35})))
            .expect("response queued");
        let case = TestCase::new("paris", json!({"city": "Paris"})).expecting(json!({"lat": 48.85}));

        let result = h.service.run(h.entry.id(), &case).await.expect("test runs");

        assert_eq!(result.status, TestStatus::Failed);
        assert_eq!(result.actual, Some(json!({"lat": 48.85, "lon": 2.35})));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tool_error_is_reported_and_stored() {
        let h = harness().await;
        h.transport
            .push_response("geocode", ScriptedResponse::ToolError("city unknown".to_owned()))
            .expect("response queued");
        let case = TestCase::new("atlantis", json!({"city": "Atlantis"}));

        let result = h.service.run(h.entry.id(), &case).await.expect("test runs");

        assert_eq!(result.status, TestStatus::Error);
        assert!(result.error.as_deref().is_some_and(|error| error.contains("city unknown")));
        let stored = h
            .service
            .list_for_entry(h.entry.id())
            .await
            .expect("results listed");
        assert_eq!(stored, vec![result]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unhealthy_server_is_not_called() {
        let h = harness().await;
        h.servers
            .update_health(
                h.server.id(),
                &ServerHealthSnapshot::unhealthy(DefaultClock.utc(), "down"),
            )
            .await
            .expect("health stored");

        let result = h
            .service
            .run(h.entry.id(), &TestCase::new("paris", json!({})))
            .await
            .expect("test runs");

        assert_eq!(result.status, TestStatus::Error);
        assert_eq!(h.transport.invocation_count("geocode").expect("count"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_calls_do_not_touch_usage_stats() {
        let h = harness().await;
        h.service
            .run(h.entry.id(), &TestCase::new("paris", json!({})))
            .await
            .expect("test runs");

        let entry = h
            .catalog
            .find_by_id(h.entry.id())
            .await
            .expect("lookup succeeds")
            .expect("entry exists");
        assert_eq!(entry.stats().usage_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_entry_is_rejected() {
        let h = harness().await;
        let missing = CatalogEntryId::new();
        let result = h.service.run(missing, &TestCase::new("x", json!({}))).await;
        assert!(matches!(result, Err(ToolTestError::EntryNotFound(id)) if id == missing));
    }
}
