//! Port contracts for endpoint definitions, execution records and test runs.

mod endpoint;
mod records;
mod test_results;

pub use endpoint::{EndpointRepository, EndpointRepositoryError, EndpointResult};
pub use records::{ExecutionRecordRepository, RecordResult, RecordStoreError};
pub use test_results::TestResultRepository;
