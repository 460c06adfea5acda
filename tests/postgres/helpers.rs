//! Shared helpers for `PostgreSQL` integration tests.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::TestCluster;
use rstest::fixture;
use tokio::runtime::Runtime;
use tool_gateway::tool_registry::{
    adapters::postgres::{PostgresCatalog, PostgresServerRegistry, ToolRegistryPgPool},
    domain::{ServerName, ServerTransport, ToolServer},
};

/// SQL creating the registry tables.
const CREATE_REGISTRY_SQL: &str =
    include_str!("../../migrations/2026-01-01-000000_create_tool_registry/up.sql");

/// Template database name for the pre-migrated schema.
const TEMPLATE_DB: &str = "tool_gateway_test_template";

/// Provides a [`DefaultClock`] for test fixtures.
#[fixture]
pub fn clock() -> DefaultClock {
    DefaultClock
}

/// Creates a multi-threaded runtime so pooled blocking work can overlap.
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create test runtime")
}

/// Ensures the template database exists with the schema applied.
pub fn ensure_template(cluster: &TestCluster) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            conn.batch_execute(CREATE_REGISTRY_SQL)
                .map_err(|e| eyre::eyre!("migration failed: {e}"))?;
            Ok(())
        })
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    Ok(())
}

/// Repositories sharing one pool over a fresh database.
pub struct Repositories {
    pub servers: PostgresServerRegistry,
    pub catalog: PostgresCatalog,
}

/// Creates a database from the template and builds both repositories on it.
pub fn setup_repositories(
    cluster: &TestCluster,
    db_name: &str,
    pool_size: u32,
) -> Result<Repositories, Box<dyn std::error::Error + Send + Sync>> {
    cluster
        .create_database_from_template(db_name, TEMPLATE_DB)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    let url = cluster.connection().database_url(db_name);
    let manager = ConnectionManager::<PgConnection>::new(url);
    let pool: ToolRegistryPgPool = Pool::builder()
        .max_size(pool_size)
        .build(manager)
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
    Ok(Repositories {
        servers: PostgresServerRegistry::new(pool.clone()),
        catalog: PostgresCatalog::new(pool),
    })
}

/// Builds a request/response server at `url`.
pub fn server(clock: &DefaultClock, name: &str, url: &str) -> ToolServer {
    ToolServer::new(
        ServerName::new(name).expect("valid name"),
        ServerTransport::request_response(url).expect("valid url"),
        clock,
    )
}

/// Drops the per-test database even when the test panics.
pub struct CleanupGuard<'a> {
    cluster: &'a TestCluster,
    db_name: String,
}

impl<'a> CleanupGuard<'a> {
    pub const fn new(cluster: &'a TestCluster, db_name: String) -> Self {
        Self { cluster, db_name }
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.cluster.drop_database(self.db_name.as_str()) {
            tracing::warn!(db = %self.db_name, error = %err, "failed to drop test database");
        }
    }
}
