//! Domain model for gateway endpoints and their execution.
//!
//! Endpoints own ordered bindings whose mappings and conditions are parsed
//! into expression trees when composed. Execution produces per-binding
//! outcomes and one append-only record per attempt.

mod binding;
mod endpoint;
mod error;
mod expression;
mod ids;
mod outcome;
mod record;
mod test_result;

pub use binding::{Binding, BindingTarget, ErrorPolicy, INPUT_ROOT, NewBinding, RetryPolicy};
pub use endpoint::{
    Endpoint, EndpointHealth, EndpointStatus, EndpointUsage, RateLimitPolicy, TimeoutPolicy,
    Visibility, normalize_path,
};
pub use error::{GatewayDomainError, ParseEndpointStatusError, ParseRecordStatusError};
pub use expression::{EvaluationError, Expression, ExpressionError, Reference};
pub use ids::{BindingId, EndpointId, ExecutionId, ExecutionRecordId, TestResultId};
pub use outcome::{BindingOutcome, BindingStatus, ExecutionOutcome, ExecutionStatus};
pub use record::{ErrorDetail, ErrorKind, ExecutionRecord, RecordScope, RecordStatus, new_trace_id};
pub use test_result::{AssertionResult, TestCase, TestResult, TestStatus};
