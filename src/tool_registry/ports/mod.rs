//! Port contracts for the server registry, tool catalog and transports.

mod catalog;
mod references;
mod repository;
mod transport;

pub use catalog::{CatalogError, CatalogRepository, CatalogResult};
pub use references::{BindingReferenceError, BindingReferences};
pub use repository::{ServerRegistryError, ServerRegistryResult, ServerRepository};
pub use transport::{ToolCall, ToolOutput, ToolTransport, ToolTransportError, ToolTransportResult};
