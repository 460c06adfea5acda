//! Service layer for server registration, activation and health checks.

use crate::tool_registry::{
    domain::{
        AuthConfig, ServerHealthSnapshot, ServerId, ServerName, ServerTransport, ToolRegistryDomainError,
        ToolServer,
    },
    ports::{
        BindingReferenceError, BindingReferences, CatalogError, CatalogRepository,
        ServerRegistryError, ServerRepository, ToolTransport,
    },
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default upper bound for a single health probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Request payload for registering a tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterServerRequest {
    /// Unique server name.
    pub name: String,
    /// Transport configuration.
    pub transport: ServerTransport,
    /// Credentials applied by the transport.
    pub auth: AuthConfig,
    /// Declared capability tags.
    pub capabilities: Vec<String>,
}

impl RegisterServerRequest {
    /// Creates a registration request without credentials or capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>, transport: ServerTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            auth: AuthConfig::None,
            capabilities: Vec::new(),
        }
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Declares capability tags.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = String>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }
}

/// Service-level errors for registry operations.
#[derive(Debug, Error)]
pub enum ServerRegistryServiceError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] ToolRegistryDomainError),
    /// Server repository operation failed.
    #[error(transparent)]
    Repository(#[from] ServerRegistryError),
    /// Catalog repository operation failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Binding reference lookup failed.
    #[error(transparent)]
    References(#[from] BindingReferenceError),
    /// No server exists with the given identifier.
    #[error("tool server {0} not found")]
    NotFound(ServerId),
    /// Bindings still reference the server.
    #[error("tool server {server_id} is referenced by {bindings} binding(s)")]
    ReferentialConflict {
        /// Server identifier.
        server_id: ServerId,
        /// Number of referencing bindings.
        bindings: usize,
    },
}

/// Result type for registry service operations.
pub type ServerRegistryServiceResult<T> = Result<T, ServerRegistryServiceError>;

/// Server registry orchestration service.
pub struct ServerRegistryService<R, K, B, T, C>
where
    R: ServerRepository,
    K: CatalogRepository,
    B: BindingReferences,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    catalog: Arc<K>,
    references: Arc<B>,
    transport: Arc<T>,
    clock: Arc<C>,
    probe_timeout: Duration,
}

impl<R, K, B, T, C> Clone for ServerRegistryService<R, K, B, T, C>
where
    R: ServerRepository,
    K: CatalogRepository,
    B: BindingReferences,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            catalog: Arc::clone(&self.catalog),
            references: Arc::clone(&self.references),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            probe_timeout: self.probe_timeout,
        }
    }
}

impl<R, K, B, T, C> ServerRegistryService<R, K, B, T, C>
where
    R: ServerRepository,
    K: CatalogRepository,
    B: BindingReferences,
    T: ToolTransport,
    C: Clock + Send + Sync,
{
    /// Creates a new registry service.
    #[must_use]
    pub const fn new(
        repository: Arc<R>,
        catalog: Arc<K>,
        references: Arc<B>,
        transport: Arc<T>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository,
            catalog,
            references,
            transport,
            clock,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Overrides the per-probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    async fn find_server_or_error(
        &self,
        server_id: ServerId,
    ) -> ServerRegistryServiceResult<ToolServer> {
        self.repository
            .find_by_id(server_id)
            .await?
            .ok_or(ServerRegistryServiceError::NotFound(server_id))
    }

    /// Registers a new server with `unknown` health.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryServiceError`] when validation fails or the
    /// name or address is already taken.
    pub async fn register(
        &self,
        request: RegisterServerRequest,
    ) -> ServerRegistryServiceResult<ToolServer> {
        let server_name = ServerName::new(request.name)?;
        let server = ToolServer::new(server_name, request.transport, &*self.clock)
            .with_auth(request.auth)
            .with_capabilities(request.capabilities)?;
        self.repository.register(&server).await?;
        info!(
            server = %server.name(),
            transport = %server.transport().kind(),
            address = %server.address(),
            "registered tool server"
        );
        Ok(server)
    }

    /// Removes a server and purges its catalog entries.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryServiceError::ReferentialConflict`] while any
    /// binding references the server, [`ServerRegistryServiceError::NotFound`]
    /// for unknown servers, or persistence errors.
    pub async fn deregister(&self, server_id: ServerId) -> ServerRegistryServiceResult<()> {
        let server = self.find_server_or_error(server_id).await?;
        let bindings = self.references.count_bindings_for_server(server_id).await?;
        if bindings > 0 {
            return Err(ServerRegistryServiceError::ReferentialConflict {
                server_id,
                bindings,
            });
        }
        let purged = self.catalog.remove_for_server(server_id).await?;
        self.repository.remove(server_id).await?;
        info!(server = %server.name(), purged, "deregistered tool server");
        Ok(())
    }

    /// Activates or deactivates a server.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryServiceError::NotFound`] when no server has the
    /// given ID, or persistence errors.
    pub async fn set_active(
        &self,
        server_id: ServerId,
        active: bool,
    ) -> ServerRegistryServiceResult<ToolServer> {
        let mut server = self.find_server_or_error(server_id).await?;
        server.set_active(active, &*self.clock);
        self.repository.update(&server).await?;
        info!(server = %server.name(), active, "changed tool server activation");
        Ok(server)
    }

    /// Probes a server and persists the resulting health snapshot.
    ///
    /// Transport failures and probe timeouts produce an `unhealthy` snapshot
    /// rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRegistryServiceError::NotFound`] when no server has the
    /// given ID, [`ToolRegistryDomainError::ServerInactive`] for inactive
    /// servers, or persistence errors.
    pub async fn check_health(&self, server_id: ServerId) -> ServerRegistryServiceResult<ToolServer> {
        let server = self.find_server_or_error(server_id).await?;
        server.ensure_active()?;

        let previous = server.health().status();
        let probe = tokio::time::timeout(self.probe_timeout, self.transport.probe(&server)).await;
        let checked_at = self.clock.utc();
        let snapshot = match probe {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(err)) => ServerHealthSnapshot::unhealthy(checked_at, err.to_string()),
            Err(_) => ServerHealthSnapshot::unhealthy(
                checked_at,
                format!("probe exceeded {}ms", self.probe_timeout.as_millis()),
            ),
        };

        let stored = self.repository.update_health(server_id, &snapshot).await?;
        if !stored.is_active() {
            debug!(
                server = %stored.name(),
                "server deactivated during health check, result dropped"
            );
            return Ok(stored);
        }

        let current = stored.health().status();
        if current != previous {
            warn!(
                server = %stored.name(),
                from = %previous,
                to = %current,
                message = stored.health().message().unwrap_or_default(),
                "tool server health changed"
            );
        }
        Ok(stored)
    }

    /// Finds a server by identifier.
    ///
    /// # Errors
    ///
    /// Returns persistence errors from the repository.
    pub async fn find_by_id(
        &self,
        server_id: ServerId,
    ) -> ServerRegistryServiceResult<Option<ToolServer>> {
        Ok(self.repository.find_by_id(server_id).await?)
    }

    /// Finds a server by name.
    ///
    /// # Errors
    ///
    /// Returns domain validation errors when the name is invalid and
    /// persistence errors from the repository.
    pub async fn find_by_name(
        &self,
        server_name: &str,
    ) -> ServerRegistryServiceResult<Option<ToolServer>> {
        let validated_name = ServerName::new(server_name)?;
        Ok(self.repository.find_by_name(&validated_name).await?)
    }

    /// Lists all registered servers.
    ///
    /// # Errors
    ///
    /// Returns persistence-layer errors from the repository.
    pub async fn list_all(&self) -> ServerRegistryServiceResult<Vec<ToolServer>> {
        Ok(self.repository.list_all().await?)
    }
}
