//! Discovery sweeps that keep the tool catalog in step with each server.

use crate::tool_registry::{
    domain::{CatalogEntry, CatalogEntryId, ServerId, ToolRegistryDomainError},
    ports::{
        CatalogError, CatalogRepository, ServerRegistryError, ServerRepository, ToolTransport,
        ToolTransportError,
    },
};
use mockable::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Service-level errors for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] ToolRegistryDomainError),
    /// Server repository operation failed.
    #[error(transparent)]
    Servers(#[from] ServerRegistryError),
    /// Catalog repository operation failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The transport could not list tools.
    #[error(transparent)]
    Transport(#[from] ToolTransportError),
    /// No server exists with the given identifier.
    #[error("tool server {0} not found")]
    ServerNotFound(ServerId),
}

/// Result type for catalog service operations.
pub type CatalogServiceResult<T> = Result<T, CatalogServiceError>;

/// Outcome of a discovery sweep across all active servers.
#[derive(Debug, Default)]
pub struct DiscoverySweep {
    /// Servers refreshed successfully with their entry counts.
    pub refreshed: Vec<(ServerId, usize)>,
    /// Servers whose discovery failed.
    pub failures: Vec<(ServerId, CatalogServiceError)>,
}

/// Tool catalog orchestration service.
pub struct CatalogService<R, K, T, C>
where
    R: ServerRepository,
    K: CatalogRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    servers: Arc<R>,
    catalog: Arc<K>,
    transport: Arc<T>,
    clock: Arc<C>,
}

impl<R, K, T, C> Clone for CatalogService<R, K, T, C>
where
    R: ServerRepository,
    K: CatalogRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            servers: Arc::clone(&self.servers),
            catalog: Arc::clone(&self.catalog),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, K, T, C> CatalogService<R, K, T, C>
where
    R: ServerRepository,
    K: CatalogRepository,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    /// Creates a new catalog service.
    #[must_use]
    pub const fn new(servers: Arc<R>, catalog: Arc<K>, transport: Arc<T>, clock: Arc<C>) -> Self {
        Self {
            servers,
            catalog,
            transport,
            clock,
        }
    }

    /// Lists the server's tools and reconciles the catalog with the listing.
    ///
    /// New tools are added, listed tools are refreshed and made available,
    /// and entries missing from the listing are marked unavailable. Entries
    /// are never deleted and usage statistics are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogServiceError::ServerNotFound`] for unknown servers,
    /// [`ToolRegistryDomainError::ServerInactive`] for inactive ones, and
    /// transport or persistence errors.
    pub async fn discover(&self, server_id: ServerId) -> CatalogServiceResult<Vec<CatalogEntry>> {
        let server = self
            .servers
            .find_by_id(server_id)
            .await?
            .ok_or(CatalogServiceError::ServerNotFound(server_id))?;
        server.ensure_active()?;

        let listing = self.transport.list_tools(&server).await?;
        let mut existing = self.catalog.list_for_server(server_id).await?;
        let mut listed = HashSet::new();
        let mut added = 0_usize;

        for definition in &listing {
            if !listed.insert(definition.name().to_owned()) {
                warn!(server = %server.name(), tool = definition.name(), "duplicate tool in listing ignored");
                continue;
            }
            let current = existing
                .iter_mut()
                .find(|entry| entry.tool_name() == definition.name());
            match current {
                Some(entry) => {
                    if entry.refresh(definition, &*self.clock) {
                        info!(
                            server = %server.name(),
                            tool = definition.name(),
                            digest = entry.schema_digest(),
                            "tool schema changed"
                        );
                    }
                    self.catalog.upsert(entry).await?;
                }
                None => {
                    let entry = CatalogEntry::discovered(server_id, definition, &*self.clock);
                    self.catalog.upsert(&entry).await?;
                    added += 1;
                }
            }
        }

        let mut withdrawn = 0_usize;
        for entry in existing
            .iter_mut()
            .filter(|entry| !listed.contains(entry.tool_name()))
        {
            if entry.is_available() {
                withdrawn += 1;
            }
            entry.mark_unavailable(&*self.clock);
            self.catalog.upsert(entry).await?;
        }

        debug!(
            server = %server.name(),
            listed = listed.len(),
            added,
            withdrawn,
            "discovery completed"
        );
        Ok(self.catalog.list_for_server(server_id).await?)
    }

    /// Runs discovery against every active server.
    ///
    /// Per-server failures are logged and reported in the sweep rather than
    /// aborting it.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when the server list cannot be read.
    pub async fn discover_all(&self) -> CatalogServiceResult<DiscoverySweep> {
        let mut sweep = DiscoverySweep::default();
        for server in self.servers.list_all().await? {
            if !server.is_active() {
                continue;
            }
            match self.discover(server.id()).await {
                Ok(entries) => sweep.refreshed.push((server.id(), entries.len())),
                Err(err) => {
                    warn!(server = %server.name(), error = %err, "discovery failed");
                    sweep.failures.push((server.id(), err));
                }
            }
        }
        Ok(sweep)
    }

    /// Lists catalog entries for one server.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the catalog.
    pub async fn list_for_server(
        &self,
        server_id: ServerId,
    ) -> CatalogServiceResult<Vec<CatalogEntry>> {
        Ok(self.catalog.list_for_server(server_id).await?)
    }

    /// Finds a catalog entry by identifier.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the catalog.
    pub async fn find_by_id(
        &self,
        entry_id: CatalogEntryId,
    ) -> CatalogServiceResult<Option<CatalogEntry>> {
        Ok(self.catalog.find_by_id(entry_id).await?)
    }

    /// Finds a catalog entry by server and tool name.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the catalog.
    pub async fn find_by_tool(
        &self,
        server_id: ServerId,
        tool_name: &str,
    ) -> CatalogServiceResult<Option<CatalogEntry>> {
        Ok(self.catalog.find_by_tool(server_id, tool_name).await?)
    }
}
