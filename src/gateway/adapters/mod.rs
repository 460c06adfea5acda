//! Adapter implementations for gateway ports.

pub mod memory;
