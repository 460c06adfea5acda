//! Application services for endpoint composition, execution, record queries
//! and tool test runs.

mod backoff;
mod composer;
mod engine;
mod rate_limit;
mod records;
mod testing;

pub use backoff::{backoff_ceiling, backoff_delay};
pub use composer::{
    AddBindingRequest, CreateEndpointRequest, EndpointComposer, EndpointComposerError,
    EndpointComposerResult, TargetSpec,
};
pub use engine::{ExecutionEngine, GatewayError, GatewayResult};
pub use rate_limit::RateLimiter;
pub use records::RecordQueryService;
pub use testing::{ToolTestError, ToolTestResult, ToolTestService};
