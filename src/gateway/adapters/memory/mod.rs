//! In-memory adapters for gateway ports.

mod endpoint_repository;
mod record_store;

pub use endpoint_repository::InMemoryEndpointRepository;
pub use record_store::{InMemoryRecordStore, InMemoryTestResults};
