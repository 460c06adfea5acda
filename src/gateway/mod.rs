//! Gateway bounded context.
//!
//! Endpoints compose cataloged tools into ordered bindings. The execution
//! engine runs a caller payload through those bindings and appends one
//! record per attempt; the composer validates definitions before they can be
//! activated.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
