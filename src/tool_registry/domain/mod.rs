//! Domain model for tool servers and the tool catalog.
//!
//! The tool registry domain models server identity, transport and credential
//! configuration, health states, discovered tool metadata and the rolling
//! usage statistics kept per catalog entry. Infrastructure concerns remain
//! outside this boundary.

mod auth;
mod catalog;
mod error;
mod health;
mod ids;
mod server;
mod tool;
mod transport;

pub use auth::AuthConfig;
pub use catalog::{CatalogEntry, PersistedCatalogEntryData, UsageSample, UsageStats};
pub use error::{ParseServerHealthStatusError, ParseTransportKindError, ToolRegistryDomainError};
pub use health::{ServerHealthSnapshot, ServerHealthStatus};
pub use ids::{CatalogEntryId, ServerId, ServerName};
pub use server::{PersistedToolServerData, ToolServer};
pub use tool::ToolDefinition;
pub use transport::{
    HttpTransportConfig, ProcessPipeConfig, ServerTransport, TransportKind,
};
