//! In-memory adapters for the server registry and tool catalog.

mod catalog_repository;
mod server_repository;

pub use catalog_repository::InMemoryCatalog;
pub use server_repository::InMemoryServerRegistry;
