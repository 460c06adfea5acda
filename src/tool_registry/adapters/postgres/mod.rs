//! `PostgreSQL` adapters for server registry and catalog persistence.

mod catalog_repository;
mod models;
mod schema;
mod server_repository;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub use catalog_repository::PostgresCatalog;
pub use server_repository::PostgresServerRegistry;

/// `PostgreSQL` connection pool shared by the registry adapters.
pub type ToolRegistryPgPool = Pool<ConnectionManager<PgConnection>>;
