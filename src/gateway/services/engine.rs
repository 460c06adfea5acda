//! Endpoint execution: sequential bindings with retry, error policy and
//! deadlines.
//!
//! One invocation walks the endpoint's enabled bindings in execution order.
//! Each binding evaluates its condition, maps its input from the execution
//! context, checks that its server accepts calls and then invokes the tool,
//! retrying with jittered exponential backoff. Every attempt is appended to
//! the record store before the next one starts.

use super::{RateLimiter, backoff_delay};
use crate::gateway::{
    domain::{
        Binding, BindingOutcome, BindingStatus, BindingTarget, Endpoint, EndpointStatus,
        ErrorDetail, ErrorKind, ErrorPolicy, ExecutionId, ExecutionOutcome, ExecutionRecord,
        ExecutionStatus, INPUT_ROOT, RecordScope, RecordStatus, new_trace_id, normalize_path,
    },
    ports::{EndpointRepository, ExecutionRecordRepository},
};
use crate::tool_registry::{
    domain::{CatalogEntryId, ServerId, ToolServer},
    ports::{CatalogRepository, ServerRepository, ToolCall, ToolTransport, ToolTransportError},
    services::UsageAccumulator,
};
use mockable::Clock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Errors that prevent an invocation from producing an outcome.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No endpoint matches the path or name.
    #[error("endpoint '{0}' not found")]
    NotFound(String),

    /// The endpoint exists but is not active.
    #[error("endpoint '{name}' is {status}")]
    Inactive {
        /// Endpoint name.
        name: String,
        /// Current status.
        status: EndpointStatus,
    },

    /// The endpoint's rate limit is exhausted for the current window.
    #[error("endpoint '{0}' rate limit exceeded")]
    RateLimited(String),

    /// An unexpected fault; partial results are discarded.
    #[error("internal error: {0}")]
    Internal(Arc<dyn std::error::Error + Send + Sync>),
}

impl GatewayError {
    /// Wraps an unexpected fault.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(Arc::new(err))
    }

    /// Returns the stable error kind exposed to callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Inactive { .. } => "inactive",
            Self::RateLimited(_) => "rate_limited",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type for engine operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Executes gateway endpoints.
pub struct ExecutionEngine<E, S, K, R, T, C>
where
    E: EndpointRepository,
    S: ServerRepository,
    K: CatalogRepository,
    R: ExecutionRecordRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    endpoints: Arc<E>,
    servers: Arc<S>,
    catalog: Arc<K>,
    records: Arc<R>,
    transport: Arc<T>,
    clock: Arc<C>,
    usage: UsageAccumulator<K>,
    limiter: Arc<RateLimiter>,
}

impl<E, S, K, R, T, C> Clone for ExecutionEngine<E, S, K, R, T, C>
where
    E: EndpointRepository,
    S: ServerRepository,
    K: CatalogRepository,
    R: ExecutionRecordRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            endpoints: Arc::clone(&self.endpoints),
            servers: Arc::clone(&self.servers),
            catalog: Arc::clone(&self.catalog),
            records: Arc::clone(&self.records),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            usage: self.usage.clone(),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

/// Mutable state of one invocation.
struct Invocation {
    execution_id: ExecutionId,
    trace_id: String,
    deadline: Instant,
    context: Value,
    bindings: BTreeMap<String, BindingOutcome>,
}

impl Invocation {
    fn new(execution_id: ExecutionId, payload: Value, total: Duration) -> Self {
        let mut context = Map::new();
        context.insert(INPUT_ROOT.to_owned(), payload);
        Self {
            execution_id,
            trace_id: new_trace_id(),
            deadline: Instant::now() + total,
            context: Value::Object(context),
            bindings: BTreeMap::new(),
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn publish(&mut self, alias: &str, outcome: BindingOutcome) {
        if let Value::Object(context) = &mut self.context {
            context.insert(alias.to_owned(), outcome.context_entry());
        }
        self.bindings.insert(alias.to_owned(), outcome);
    }
}

/// Tool a binding resolves to for this invocation.
struct ResolvedTarget {
    server_id: ServerId,
    tool_name: String,
    entry_id: Option<CatalogEntryId>,
    unavailable: Option<String>,
}

/// Everything an attempt loop needs once the binding passed its checks.
struct PreparedCall<'a> {
    binding: &'a Binding,
    scope: RecordScope,
    server: ToolServer,
    target: ResolvedTarget,
    input: Value,
    timeout: Duration,
}

enum Step {
    Skipped,
    Finished(BindingOutcome),
}

enum Attempt {
    Succeeded(BindingOutcome),
    Cancelled(BindingOutcome),
    Failed {
        status: BindingStatus,
        detail: ErrorDetail,
        retryable: bool,
    },
}

impl<E, S, K, R, T, C> ExecutionEngine<E, S, K, R, T, C>
where
    E: EndpointRepository,
    S: ServerRepository,
    K: CatalogRepository,
    R: ExecutionRecordRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    /// Creates an engine.
    #[must_use]
    pub fn new(
        endpoints: Arc<E>,
        servers: Arc<S>,
        catalog: Arc<K>,
        records: Arc<R>,
        transport: Arc<T>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            endpoints,
            servers,
            usage: UsageAccumulator::new(Arc::clone(&catalog)),
            catalog,
            records,
            transport,
            clock,
            limiter: Arc::new(RateLimiter::new()),
        }
    }

    /// Executes the endpoint addressed by `target`, a path or a name.
    ///
    /// Binding failures are reported in the outcome, never as errors.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotFound`], [`GatewayError::Inactive`],
    /// [`GatewayError::RateLimited`], or [`GatewayError::Internal`] when a
    /// record cannot be persisted.
    #[instrument(
        skip(self, payload),
        fields(endpoint = tracing::field::Empty, execution_id = tracing::field::Empty)
    )]
    pub async fn execute(
        &self,
        target: &str,
        payload: Value,
        execution_id: Option<ExecutionId>,
    ) -> GatewayResult<ExecutionOutcome> {
        let endpoint = self.resolve_endpoint(target).await?;
        let span = tracing::Span::current();
        span.record("endpoint", endpoint.name());
        if endpoint.status() != EndpointStatus::Active {
            return Err(GatewayError::Inactive {
                name: endpoint.name().to_owned(),
                status: endpoint.status(),
            });
        }
        if let Some(policy) = endpoint.rate_limit()
            && !self.limiter.try_admit(endpoint.id(), policy)
        {
            warn!(endpoint = endpoint.name(), "rate limit exceeded");
            return Err(GatewayError::RateLimited(endpoint.name().to_owned()));
        }

        let execution_id = execution_id.unwrap_or_default();
        span.record("execution_id", tracing::field::display(execution_id));
        let started = Instant::now();
        let mut invocation = Invocation::new(execution_id, payload, endpoint.timeouts().total());
        let status = self.run_bindings(&endpoint, &mut invocation).await?;
        let latency_ms = millis(started.elapsed());

        if let Err(err) = self
            .endpoints
            .record_invocation(endpoint.id(), status, latency_ms, self.clock.utc())
            .await
        {
            warn!(endpoint = endpoint.name(), error = %err, "failed to update endpoint usage");
        }
        info!(
            endpoint = endpoint.name(),
            %status,
            latency_ms,
            bindings = invocation.bindings.len(),
            "endpoint execution finished"
        );
        Ok(ExecutionOutcome {
            status,
            bindings: invocation.bindings,
            trace_id: invocation.trace_id,
            execution_id,
            endpoint_id: Some(endpoint.id()),
            latency_ms,
        })
    }

    async fn resolve_endpoint(&self, target: &str) -> GatewayResult<Endpoint> {
        if let Ok(path) = normalize_path(target)
            && let Some(endpoint) = self
                .endpoints
                .find_by_path(&path)
                .await
                .map_err(GatewayError::internal)?
        {
            return Ok(endpoint);
        }
        self.endpoints
            .find_by_name(target.trim())
            .await
            .map_err(GatewayError::internal)?
            .ok_or_else(|| GatewayError::NotFound(target.to_owned()))
    }

    async fn run_bindings(
        &self,
        endpoint: &Endpoint,
        invocation: &mut Invocation,
    ) -> GatewayResult<ExecutionStatus> {
        let mut required_failed = false;
        for binding in endpoint.bindings().iter().filter(|binding| binding.is_enabled()) {
            if invocation.remaining().is_zero() {
                warn!(endpoint = endpoint.name(), "endpoint deadline expired");
                return Ok(ExecutionStatus::Timeout);
            }
            let Step::Finished(outcome) = self.run_binding(endpoint, binding, invocation).await?
            else {
                continue;
            };
            let status = outcome.status;
            invocation.publish(binding.alias(), outcome);
            match status {
                BindingStatus::Completed | BindingStatus::Substituted => {}
                BindingStatus::Cancelled => return Ok(ExecutionStatus::Timeout),
                BindingStatus::Failed | BindingStatus::Timeout => {
                    if *binding.error_policy() == ErrorPolicy::Abort {
                        warn!(
                            endpoint = endpoint.name(),
                            alias = binding.alias(),
                            "binding failed, aborting execution"
                        );
                        return Ok(ExecutionStatus::Failed);
                    }
                    required_failed |= binding.is_required();
                }
            }
        }
        Ok(if required_failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        })
    }

    async fn run_binding(
        &self,
        endpoint: &Endpoint,
        binding: &Binding,
        invocation: &Invocation,
    ) -> GatewayResult<Step> {
        let target = self.resolve_target(binding.target()).await?;
        let scope = RecordScope {
            execution_id: invocation.execution_id,
            endpoint_id: endpoint.id(),
            binding_id: binding.id(),
            server_id: target.server_id,
            tool_name: target.tool_name.clone(),
            trace_id: invocation.trace_id.clone(),
        };

        let condition = binding
            .condition()
            .map(|condition| condition.evaluate_condition(&invocation.context))
            .transpose();
        match condition {
            Ok(Some(false)) => {
                self.append(&ExecutionRecord::skipped(&scope, &*self.clock))
                    .await?;
                debug!(alias = binding.alias(), "condition false, binding skipped");
                return Ok(Step::Skipped);
            }
            Ok(_) => {}
            Err(err) => {
                let detail = ErrorDetail::new(ErrorKind::ConditionError, err.to_string());
                let outcome = self.fail_without_call(&scope, Value::Null, detail).await?;
                return Ok(Step::Finished(apply_error_policy(binding, outcome)));
            }
        }

        let input = match map_input(binding, &invocation.context) {
            Ok(input) => input,
            Err(detail) => {
                let outcome = self.fail_without_call(&scope, Value::Null, detail).await?;
                return Ok(Step::Finished(apply_error_policy(binding, outcome)));
            }
        };

        let server = match self.usable_server(&target).await? {
            Ok(server) => server,
            Err(reason) => {
                warn!(
                    alias = binding.alias(),
                    server_id = %target.server_id,
                    reason = %reason,
                    "upstream unavailable, binding short-circuited"
                );
                let detail = ErrorDetail::new(ErrorKind::UpstreamUnavailable, reason);
                let outcome = self.fail_without_call(&scope, input, detail).await?;
                return Ok(Step::Finished(apply_error_policy(binding, outcome)));
            }
        };

        let prepared = PreparedCall {
            binding,
            scope,
            server,
            target,
            input,
            timeout: binding
                .timeout()
                .unwrap_or_else(|| endpoint.timeouts().per_binding()),
        };
        let outcome = self.call_with_retries(&prepared, invocation).await?;
        Ok(Step::Finished(apply_error_policy(binding, outcome)))
    }

    async fn resolve_target(&self, target: &BindingTarget) -> GatewayResult<ResolvedTarget> {
        let (server_id, fallback_name, entry) = match target {
            BindingTarget::Catalog {
                entry_id,
                server_id,
            } => (
                *server_id,
                entry_id.to_string(),
                self.catalog
                    .find_by_id(*entry_id)
                    .await
                    .map_err(GatewayError::internal)?,
            ),
            BindingTarget::Raw {
                server_id,
                tool_name,
            } => (
                *server_id,
                tool_name.clone(),
                self.catalog
                    .find_by_tool(*server_id, tool_name)
                    .await
                    .map_err(GatewayError::internal)?,
            ),
        };
        Ok(match entry {
            Some(entry) if entry.is_available() => ResolvedTarget {
                server_id,
                tool_name: entry.tool_name().to_owned(),
                entry_id: Some(entry.id()),
                unavailable: None,
            },
            Some(entry) => ResolvedTarget {
                server_id,
                tool_name: entry.tool_name().to_owned(),
                entry_id: Some(entry.id()),
                unavailable: Some(format!(
                    "tool '{}' is no longer listed by its server",
                    entry.tool_name()
                )),
            },
            None => ResolvedTarget {
                server_id,
                unavailable: Some(format!("tool '{fallback_name}' is not cataloged")),
                tool_name: fallback_name,
                entry_id: None,
            },
        })
    }

    /// Returns the server when it accepts calls, or the refusal reason.
    async fn usable_server(
        &self,
        target: &ResolvedTarget,
    ) -> GatewayResult<Result<ToolServer, String>> {
        if let Some(reason) = &target.unavailable {
            return Ok(Err(reason.clone()));
        }
        let server = self
            .servers
            .find_by_id(target.server_id)
            .await
            .map_err(GatewayError::internal)?;
        Ok(match server {
            Some(server) if server.accepts_calls() => Ok(server),
            Some(server) if !server.is_active() => {
                Err(format!("tool server '{}' is inactive", server.name()))
            }
            Some(server) => Err(format!("tool server '{}' is unhealthy", server.name())),
            None => Err(format!("tool server {} is not registered", target.server_id)),
        })
    }

    async fn call_with_retries(
        &self,
        prepared: &PreparedCall<'_>,
        invocation: &Invocation,
    ) -> GatewayResult<BindingOutcome> {
        let PreparedCall {
            binding,
            scope,
            server,
            target,
            input,
            timeout,
        } = prepared;
        let policy = binding.retry();
        let mut last_failure = None;
        let mut attempts = 0;
        for attempt in 1..=policy.max_attempts() {
            let remaining = invocation.remaining();
            if remaining.is_zero() {
                return Ok(BindingOutcome::failed(
                    BindingStatus::Cancelled,
                    ErrorDetail::new(
                        ErrorKind::EndpointTimeout,
                        format!("endpoint deadline expired before attempt {attempt}"),
                    ),
                    attempts,
                ));
            }
            attempts = attempt;
            let call = ToolCall::new(
                format!("{}:{}:{attempt}", invocation.execution_id, binding.id()),
                &target.tool_name,
                input.clone(),
                (*timeout).min(remaining),
            );
            let record = ExecutionRecord::start(scope, attempt, input.clone(), &*self.clock);
            match self
                .attempt(server, &call, record, remaining < *timeout, target.entry_id)
                .await?
            {
                Attempt::Succeeded(outcome) | Attempt::Cancelled(outcome) => {
                    return Ok(BindingOutcome { attempts, ..outcome });
                }
                Attempt::Failed {
                    status,
                    detail,
                    retryable,
                } => {
                    warn!(
                        alias = binding.alias(),
                        server_id = %server.id(),
                        attempt,
                        kind = %detail.kind,
                        error = %detail.message,
                        "binding attempt failed"
                    );
                    last_failure = Some((status, detail));
                    if !retryable {
                        break;
                    }
                }
            }
            if attempt < policy.max_attempts() {
                let delay = backoff_delay(policy, attempt, &mut rand::thread_rng())
                    .min(invocation.remaining());
                tokio::time::sleep(delay).await;
            }
        }
        let (status, detail) = last_failure.unwrap_or_else(|| {
            (
                BindingStatus::Failed,
                ErrorDetail::new(ErrorKind::ToolExecutionError, "no attempt was made"),
            )
        });
        Ok(BindingOutcome::failed(status, detail, attempts))
    }

    /// Runs one attempt and appends its record.
    async fn attempt(
        &self,
        server: &ToolServer,
        call: &ToolCall,
        record: ExecutionRecord,
        endpoint_bound: bool,
        entry_id: Option<CatalogEntryId>,
    ) -> GatewayResult<Attempt> {
        let started = Instant::now();
        let result = tokio::time::timeout(call.timeout, self.transport.invoke(server, call)).await;
        let elapsed = started.elapsed();
        let clock = &*self.clock;

        let attempt = match result {
            Ok(Ok(output)) => {
                self.append(&record.completed(
                    output.content.clone(),
                    output.resource_usage,
                    elapsed,
                    clock,
                ))
                .await?;
                self.track_usage(entry_id, elapsed, true).await;
                Attempt::Succeeded(BindingOutcome::completed(output.content, 1))
            }
            Ok(Err(err)) => {
                let (status, detail, retryable) = classify(&err);
                let record_status = if status == BindingStatus::Timeout {
                    RecordStatus::Timeout
                } else {
                    RecordStatus::Failed
                };
                self.append(&record.failed(record_status, detail.clone(), elapsed, clock))
                    .await?;
                self.track_usage(entry_id, elapsed, false).await;
                Attempt::Failed {
                    status,
                    detail,
                    retryable,
                }
            }
            Err(_) => {
                self.request_cancel(server, &call.call_id).await;
                if endpoint_bound {
                    let detail = ErrorDetail::new(
                        ErrorKind::EndpointTimeout,
                        "endpoint deadline expired during the call",
                    );
                    self.append(&record.failed(
                        RecordStatus::Cancelled,
                        detail.clone(),
                        elapsed,
                        clock,
                    ))
                    .await?;
                    Attempt::Cancelled(BindingOutcome::failed(BindingStatus::Cancelled, detail, 1))
                } else {
                    let detail = ErrorDetail::new(
                        ErrorKind::BindingTimeout,
                        format!("no reply within {} ms", call.timeout.as_millis()),
                    );
                    self.append(&record.failed(
                        RecordStatus::Timeout,
                        detail.clone(),
                        elapsed,
                        clock,
                    ))
                    .await?;
                    self.track_usage(entry_id, elapsed, false).await;
                    Attempt::Failed {
                        status: BindingStatus::Timeout,
                        detail,
                        retryable: true,
                    }
                }
            }
        };
        Ok(attempt)
    }

    async fn fail_without_call(
        &self,
        scope: &RecordScope,
        input: Value,
        detail: ErrorDetail,
    ) -> GatewayResult<BindingOutcome> {
        let record = ExecutionRecord::start(scope, 1, input, &*self.clock).failed(
            RecordStatus::Failed,
            detail.clone(),
            Duration::ZERO,
            &*self.clock,
        );
        self.append(&record).await?;
        Ok(BindingOutcome::failed(BindingStatus::Failed, detail, 1))
    }

    async fn append(&self, record: &ExecutionRecord) -> GatewayResult<()> {
        self.records.append(record).await.map_err(|err| {
            tracing::error!(
                execution_id = %record.execution_id(),
                error = %err,
                "failed to persist execution record"
            );
            GatewayError::internal(err)
        })
    }

    async fn track_usage(&self, entry_id: Option<CatalogEntryId>, elapsed: Duration, success: bool) {
        let Some(entry_id) = entry_id else {
            return;
        };
        if let Err(err) = self.usage.record_elapsed(entry_id, elapsed, success).await {
            warn!(%entry_id, error = %err, "failed to record tool usage");
        }
    }

    async fn request_cancel(&self, server: &ToolServer, call_id: &str) {
        if let Err(err) = self.transport.cancel(server, call_id).await {
            debug!(server_id = %server.id(), call_id, error = %err, "cancellation not delivered");
        }
    }
}

fn map_input(binding: &Binding, context: &Value) -> Result<Value, ErrorDetail> {
    let mut arguments = Map::new();
    for (field, expression) in binding.mapping() {
        let value = expression.evaluate(context).map_err(|err| {
            ErrorDetail::new(
                ErrorKind::MappingError,
                format!("mapping for '{field}' failed: {err}"),
            )
        })?;
        arguments.insert(field.clone(), value);
    }
    Ok(Value::Object(arguments))
}

fn apply_error_policy(binding: &Binding, outcome: BindingOutcome) -> BindingOutcome {
    match binding.error_policy() {
        ErrorPolicy::Substitute { fallback }
            if matches!(outcome.status, BindingStatus::Failed | BindingStatus::Timeout) =>
        {
            let error = outcome.error.unwrap_or_else(|| {
                ErrorDetail::new(ErrorKind::ToolExecutionError, "binding failed")
            });
            BindingOutcome::substituted(fallback.clone(), error, outcome.attempts)
        }
        ErrorPolicy::Abort | ErrorPolicy::Skip | ErrorPolicy::Substitute { .. } => outcome,
    }
}

fn classify(err: &ToolTransportError) -> (BindingStatus, ErrorDetail, bool) {
    let message = err.to_string();
    match err {
        ToolTransportError::Unreachable { .. } | ToolTransportError::UnsupportedTransport { .. } => (
            BindingStatus::Failed,
            ErrorDetail::new(ErrorKind::UpstreamUnavailable, message),
            false,
        ),
        ToolTransportError::TimedOut(_) => (
            BindingStatus::Timeout,
            ErrorDetail::new(ErrorKind::BindingTimeout, message),
            true,
        ),
        ToolTransportError::Protocol { .. } => (
            BindingStatus::Failed,
            ErrorDetail::new(ErrorKind::ProtocolError, message),
            true,
        ),
        ToolTransportError::ToolFailed { .. } | ToolTransportError::Runtime(_) => (
            BindingStatus::Failed,
            ErrorDetail::new(ErrorKind::ToolExecutionError, message),
            true,
        ),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
