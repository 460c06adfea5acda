//! Adapter implementations for the server registry, catalog and transport
//! ports.

pub mod memory;
pub mod postgres;
pub mod transport;

mod runtime;

pub use runtime::{ScriptedResponse, ScriptedToolTransport};
