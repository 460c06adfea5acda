//! Aggregated result of one endpoint invocation.

use super::{EndpointId, ErrorDetail, ExecutionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Overall status of an endpoint invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every required binding produced an output or was skipped by policy.
    Completed,
    /// An abort policy triggered or a required binding failed.
    Failed,
    /// The endpoint deadline expired.
    Timeout,
}

impl ExecutionStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one binding within an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStatus {
    /// The tool returned output.
    Completed,
    /// The binding failed after retries.
    Failed,
    /// The binding failed and its fallback output was used.
    Substituted,
    /// The binding's own timeout expired on the final attempt.
    Timeout,
    /// The endpoint deadline expired while the binding was in flight.
    Cancelled,
}

impl BindingStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Substituted => "substituted",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether later bindings can read an output.
    #[must_use]
    pub const fn has_output(self) -> bool {
        matches!(self, Self::Completed | Self::Substituted)
    }
}

/// Per-alias entry of the response breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingOutcome {
    /// Final binding status.
    pub status: BindingStatus,
    /// Tool or fallback output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Last failure, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

impl BindingOutcome {
    /// Successful outcome.
    #[must_use]
    pub const fn completed(output: Value, attempts: u32) -> Self {
        Self {
            status: BindingStatus::Completed,
            output: Some(output),
            error: None,
            attempts,
        }
    }

    /// Failed outcome without output.
    #[must_use]
    pub const fn failed(status: BindingStatus, error: ErrorDetail, attempts: u32) -> Self {
        Self {
            status,
            output: None,
            error: Some(error),
            attempts,
        }
    }

    /// Failed outcome replaced by a fallback output.
    #[must_use]
    pub const fn substituted(fallback: Value, error: ErrorDetail, attempts: u32) -> Self {
        Self {
            status: BindingStatus::Substituted,
            output: Some(fallback),
            error: Some(error),
            attempts,
        }
    }

    /// Context value published under the binding alias.
    #[must_use]
    pub fn context_entry(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("status".to_owned(), Value::from(self.status.as_str()));
        if let Some(output) = &self.output {
            entry.insert("output".to_owned(), output.clone());
        }
        if let Some(error) = &self.error {
            entry.insert(
                "error".to_owned(),
                serde_json::json!({"kind": error.kind.as_str(), "message": error.message}),
            );
        }
        Value::Object(entry)
    }
}

/// Result returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Overall status.
    pub status: ExecutionStatus,
    /// Per-alias breakdown.
    pub bindings: BTreeMap<String, BindingOutcome>,
    /// Trace identifier shared by every record of the execution.
    pub trace_id: String,
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Endpoint executed.
    #[serde(skip)]
    pub endpoint_id: Option<EndpointId>,
    /// Wall-clock latency of the whole invocation.
    #[serde(skip)]
    pub latency_ms: u64,
}
