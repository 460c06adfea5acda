//! Append-only audit records, one per binding attempt.

use super::{BindingId, EndpointId, ExecutionId, ExecutionRecordId, ParseRecordStatusError};
use crate::tool_registry::domain::ServerId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle status of one binding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created, not started.
    Pending,
    /// Tool call in flight.
    Running,
    /// Tool returned output.
    Completed,
    /// Tool, mapping or upstream failure.
    Failed,
    /// Binding-level timeout expired.
    Timeout,
    /// Call abandoned because the endpoint deadline expired.
    Cancelled,
    /// Condition evaluated false; no call made.
    Skipped,
}

impl RecordStatus {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    /// Returns whether the record can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RecordStatus {
    type Error = ParseRecordStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            "cancelled" => Ok(Self::Cancelled),
            "skipped" => Ok(Self::Skipped),
            other => Err(ParseRecordStatusError(other.to_owned())),
        }
    }
}

/// Failure category surfaced to callers and stored on records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A parameter mapping could not be evaluated.
    MappingError,
    /// A condition could not be evaluated.
    ConditionError,
    /// The target server is unhealthy, inactive, unreachable or unresolved.
    UpstreamUnavailable,
    /// The tool reported an application-level error.
    ToolExecutionError,
    /// The server answered with a malformed reply.
    ProtocolError,
    /// The binding's own timeout expired.
    BindingTimeout,
    /// The endpoint deadline expired while the call was in flight.
    EndpointTimeout,
}

impl ErrorKind {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MappingError => "mapping_error",
            Self::ConditionError => "condition_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::ToolExecutionError => "tool_execution_error",
            Self::ProtocolError => "protocol_error",
            Self::BindingTimeout => "binding_timeout",
            Self::EndpointTimeout => "endpoint_timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ErrorDetail {
    /// Creates an error detail.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Identity shared by every record of one binding within one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordScope {
    /// Execution the attempt belongs to.
    pub execution_id: ExecutionId,
    /// Endpoint being executed.
    pub endpoint_id: EndpointId,
    /// Binding being attempted.
    pub binding_id: BindingId,
    /// Server targeted by the binding.
    pub server_id: ServerId,
    /// Tool targeted by the binding.
    pub tool_name: String,
    /// Trace identifier of the execution.
    pub trace_id: String,
}

/// One binding attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    id: ExecutionRecordId,
    execution_id: ExecutionId,
    endpoint_id: EndpointId,
    binding_id: BindingId,
    server_id: ServerId,
    tool_name: String,
    trace_id: String,
    span_id: String,
    attempt: u32,
    input: Value,
    output: Option<Value>,
    status: RecordStatus,
    error: Option<ErrorDetail>,
    latency_ms: u64,
    resource_usage: Option<Value>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Opens a running record for an attempt.
    #[must_use]
    pub fn start(scope: &RecordScope, attempt: u32, input: Value, clock: &impl Clock) -> Self {
        Self {
            id: ExecutionRecordId::new(),
            execution_id: scope.execution_id,
            endpoint_id: scope.endpoint_id,
            binding_id: scope.binding_id,
            server_id: scope.server_id,
            tool_name: scope.tool_name.clone(),
            trace_id: scope.trace_id.clone(),
            span_id: new_span_id(),
            attempt,
            input,
            output: None,
            status: RecordStatus::Running,
            error: None,
            latency_ms: 0,
            resource_usage: None,
            started_at: clock.utc(),
            ended_at: None,
        }
    }

    /// Records a skipped binding; no attempt was made.
    #[must_use]
    pub fn skipped(scope: &RecordScope, clock: &impl Clock) -> Self {
        let record = Self::start(scope, 1, Value::Null, clock);
        record.close(RecordStatus::Skipped, Duration::ZERO, clock)
    }

    /// Closes the attempt with the tool's output.
    #[must_use]
    pub fn completed(
        mut self,
        output: Value,
        resource_usage: Option<Value>,
        latency: Duration,
        clock: &impl Clock,
    ) -> Self {
        self.output = Some(output);
        self.resource_usage = resource_usage;
        self.close(RecordStatus::Completed, latency, clock)
    }

    /// Closes the attempt with a failure status.
    #[must_use]
    pub fn failed(
        mut self,
        status: RecordStatus,
        error: ErrorDetail,
        latency: Duration,
        clock: &impl Clock,
    ) -> Self {
        self.error = Some(error);
        self.close(status, latency, clock)
    }

    fn close(mut self, status: RecordStatus, latency: Duration, clock: &impl Clock) -> Self {
        self.status = status;
        self.latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.ended_at = Some(clock.utc());
        self
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> ExecutionRecordId {
        self.id
    }

    /// Returns the execution identifier.
    #[must_use]
    pub const fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns the endpoint identifier.
    #[must_use]
    pub const fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Returns the binding identifier.
    #[must_use]
    pub const fn binding_id(&self) -> BindingId {
        self.binding_id
    }

    /// Returns the targeted server.
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Returns the targeted tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the execution trace identifier.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the attempt span identifier.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Returns the one-based attempt number.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the mapped tool input.
    #[must_use]
    pub const fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the tool output, when the attempt completed.
    #[must_use]
    pub const fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    /// Returns the record status.
    #[must_use]
    pub const fn status(&self) -> RecordStatus {
        self.status
    }

    /// Returns the error detail, when the attempt failed.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    /// Returns the attempt latency in milliseconds.
    #[must_use]
    pub const fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    /// Returns resource usage reported by the tool.
    #[must_use]
    pub const fn resource_usage(&self) -> Option<&Value> {
        self.resource_usage.as_ref()
    }

    /// Returns when the attempt started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the attempt ended.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

/// Creates a 32-hex-digit trace identifier.
#[must_use]
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn new_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
