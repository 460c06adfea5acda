//! Application services for the server registry, catalog discovery, usage
//! accumulation and health monitoring.

mod catalog;
mod monitor;
mod registry;
mod usage;

pub use catalog::{CatalogService, CatalogServiceError, CatalogServiceResult, DiscoverySweep};
pub use monitor::{HealthMonitor, HealthSweep};
pub use registry::{
    DEFAULT_PROBE_TIMEOUT, RegisterServerRequest, ServerRegistryService,
    ServerRegistryServiceError, ServerRegistryServiceResult,
};
pub use usage::{UsageAccumulator, UsageError};
