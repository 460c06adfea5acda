//! Tool gateway: composes tools exposed by remote tool servers into named
//! HTTP endpoints.
//!
//! Operators register tool-provider servers, discover their tools into a
//! catalog, and compose endpoints out of ordered tool bindings whose inputs
//! are mapped from the caller payload and from earlier binding outputs.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, transports)
//! - **Services**: Orchestration over ports
//!
//! # Modules
//!
//! - [`tool_registry`]: Tool servers, health monitoring, catalog and transports
//! - [`gateway`]: Endpoint composition, execution and records
//! - [`api`]: Inbound HTTP surface
//! - [`config`]: Environment-driven process configuration

pub mod api;
pub mod config;
pub mod gateway;
pub mod tool_registry;
