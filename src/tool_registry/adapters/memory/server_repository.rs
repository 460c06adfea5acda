//! In-memory repository for tool server registrations.

use crate::tool_registry::{
    domain::{ServerHealthSnapshot, ServerId, ServerName, ToolServer},
    ports::{ServerRegistryError, ServerRegistryResult, ServerRepository},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory server registry repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServerRegistry {
    state: Arc<RwLock<InMemoryRegistryState>>,
}

#[derive(Debug, Default)]
struct InMemoryRegistryState {
    servers: HashMap<ServerId, ToolServer>,
    name_index: HashMap<ServerName, ServerId>,
    address_index: HashMap<String, ServerId>,
}

impl InMemoryServerRegistry {
    /// Creates an empty in-memory registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl ToString) -> ServerRegistryError {
    ServerRegistryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ServerRepository for InMemoryServerRegistry {
    async fn register(&self, server: &ToolServer) -> ServerRegistryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;

        if state.servers.contains_key(&server.id()) {
            return Err(ServerRegistryError::DuplicateServer(server.id()));
        }

        if state.name_index.contains_key(server.name()) {
            return Err(ServerRegistryError::DuplicateServerName(
                server.name().clone(),
            ));
        }

        let address = server.address();
        if state.address_index.contains_key(&address) {
            return Err(ServerRegistryError::DuplicateServerAddress(address));
        }

        state.name_index.insert(server.name().clone(), server.id());
        state.address_index.insert(address, server.id());
        state.servers.insert(server.id(), server.clone());
        Ok(())
    }

    async fn update(&self, server: &ToolServer) -> ServerRegistryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;

        let stored = state
            .servers
            .get(&server.id())
            .ok_or(ServerRegistryError::NotFound(server.id()))?;
        let stored_name = stored.name().clone();
        let stored_address = stored.address();

        if *server.name() != stored_name {
            if let Some(&indexed_id) = state.name_index.get(server.name())
                && indexed_id != server.id()
            {
                return Err(ServerRegistryError::DuplicateServerName(
                    server.name().clone(),
                ));
            }

            state.name_index.remove(&stored_name);
            state.name_index.insert(server.name().clone(), server.id());
        }

        let address = server.address();
        if address != stored_address {
            if let Some(&indexed_id) = state.address_index.get(&address)
                && indexed_id != server.id()
            {
                return Err(ServerRegistryError::DuplicateServerAddress(address));
            }

            state.address_index.remove(&stored_address);
            state.address_index.insert(address, server.id());
        }

        state.servers.insert(server.id(), server.clone());
        Ok(())
    }

    async fn update_health(
        &self,
        server_id: ServerId,
        snapshot: &ServerHealthSnapshot,
    ) -> ServerRegistryResult<ToolServer> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .servers
            .get_mut(&server_id)
            .ok_or(ServerRegistryError::NotFound(server_id))?;
        if stored.is_active() {
            stored.update_health(snapshot.clone());
        }
        Ok(stored.clone())
    }

    async fn remove(&self, server_id: ServerId) -> ServerRegistryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let removed = state
            .servers
            .remove(&server_id)
            .ok_or(ServerRegistryError::NotFound(server_id))?;
        state.name_index.remove(removed.name());
        state.address_index.remove(&removed.address());
        Ok(())
    }

    async fn find_by_id(&self, server_id: ServerId) -> ServerRegistryResult<Option<ToolServer>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.servers.get(&server_id).cloned())
    }

    async fn find_by_name(
        &self,
        server_name: &ServerName,
    ) -> ServerRegistryResult<Option<ToolServer>> {
        let state = self.state.read().map_err(lock_error)?;
        let server = state
            .name_index
            .get(server_name)
            .and_then(|id| state.servers.get(id))
            .cloned();
        Ok(server)
    }

    async fn list_all(&self) -> ServerRegistryResult<Vec<ToolServer>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut servers: Vec<ToolServer> = state.servers.values().cloned().collect();
        servers.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));
        Ok(servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::{ServerHealthStatus, ServerTransport};
    use mockable::{Clock, DefaultClock};

    fn server(name: &str, url: &str) -> ToolServer {
        ToolServer::new(
            ServerName::new(name).expect("valid name"),
            ServerTransport::request_response(url).expect("valid url"),
            &DefaultClock,
        )
    }

    #[tokio::test]
    async fn health_update_leaves_operator_fields_alone() {
        let registry = InMemoryServerRegistry::new();
        let stored = server("weather_tools", "http://weather.local");
        registry.register(&stored).await.expect("register");

        let snapshot = ServerHealthSnapshot::unhealthy(DefaultClock.utc(), "refused");
        let updated = registry
            .update_health(stored.id(), &snapshot)
            .await
            .expect("health stored");

        assert_eq!(updated.health(), &snapshot);
        assert_eq!(updated.updated_at(), stored.updated_at());
        assert!(updated.is_active());
    }

    #[tokio::test]
    async fn health_update_skips_inactive_servers() {
        let registry = InMemoryServerRegistry::new();
        let mut stored = server("weather_tools", "http://weather.local");
        registry.register(&stored).await.expect("register");
        stored.set_active(false, &DefaultClock);
        registry.update(&stored).await.expect("deactivate");

        let snapshot = ServerHealthSnapshot::healthy(DefaultClock.utc());
        let updated = registry
            .update_health(stored.id(), &snapshot)
            .await
            .expect("lookup succeeds");

        assert!(!updated.is_active());
        assert_eq!(updated.health().status(), ServerHealthStatus::Unknown);
    }

    #[tokio::test]
    async fn health_update_for_missing_server_is_not_found() {
        let registry = InMemoryServerRegistry::new();
        let missing = ServerId::new();
        let snapshot = ServerHealthSnapshot::healthy(DefaultClock.utc());

        let result = registry.update_health(missing, &snapshot).await;

        assert!(matches!(result, Err(ServerRegistryError::NotFound(id)) if id == missing));
    }
}
