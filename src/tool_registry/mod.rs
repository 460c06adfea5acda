//! Server registry, tool catalog and transport layer.
//!
//! Tool-provider servers are registered with their transport and credential
//! configuration, probed on a fixed interval, and queried for the tools they
//! expose. Discovered tools are kept in a catalog that also carries rolling
//! usage statistics. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
