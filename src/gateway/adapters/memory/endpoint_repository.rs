//! In-memory repository for endpoint definitions.

use crate::gateway::{
    domain::{Endpoint, EndpointId, EndpointUsage, ExecutionStatus},
    ports::{EndpointRepository, EndpointRepositoryError, EndpointResult},
};
use crate::tool_registry::{
    domain::ServerId,
    ports::{BindingReferenceError, BindingReferences},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory endpoint repository.
///
/// Also answers binding-reference lookups for server deregistration.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEndpointRepository {
    state: Arc<RwLock<InMemoryEndpointState>>,
}

#[derive(Debug, Default)]
struct InMemoryEndpointState {
    endpoints: HashMap<EndpointId, Endpoint>,
    name_index: HashMap<String, EndpointId>,
    path_index: HashMap<String, EndpointId>,
}

impl InMemoryEndpointRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl ToString) -> EndpointRepositoryError {
    EndpointRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl EndpointRepository for InMemoryEndpointRepository {
    async fn create(&self, endpoint: &Endpoint) -> EndpointResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.name_index.contains_key(endpoint.name()) {
            return Err(EndpointRepositoryError::DuplicateName(
                endpoint.name().to_owned(),
            ));
        }
        if state.path_index.contains_key(endpoint.path()) {
            return Err(EndpointRepositoryError::DuplicatePath(
                endpoint.path().to_owned(),
            ));
        }
        state
            .name_index
            .insert(endpoint.name().to_owned(), endpoint.id());
        state
            .path_index
            .insert(endpoint.path().to_owned(), endpoint.id());
        state.endpoints.insert(endpoint.id(), endpoint.clone());
        Ok(())
    }

    async fn update(&self, endpoint: &Endpoint) -> EndpointResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .endpoints
            .get_mut(&endpoint.id())
            .ok_or(EndpointRepositoryError::NotFound(endpoint.id()))?;
        let usage = stored.usage();
        *stored = endpoint.clone().with_usage(usage);
        Ok(())
    }

    async fn find_by_id(&self, endpoint_id: EndpointId) -> EndpointResult<Option<Endpoint>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.endpoints.get(&endpoint_id).cloned())
    }

    async fn find_by_path(&self, path: &str) -> EndpointResult<Option<Endpoint>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .path_index
            .get(path)
            .and_then(|id| state.endpoints.get(id))
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> EndpointResult<Option<Endpoint>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .name_index
            .get(name)
            .and_then(|id| state.endpoints.get(id))
            .cloned())
    }

    async fn list_all(&self) -> EndpointResult<Vec<Endpoint>> {
        let state = self.state.read().map_err(lock_error)?;
        let mut endpoints: Vec<_> = state.endpoints.values().cloned().collect();
        endpoints.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(endpoints)
    }

    async fn record_invocation(
        &self,
        endpoint_id: EndpointId,
        status: ExecutionStatus,
        latency_ms: u64,
        at: DateTime<Utc>,
    ) -> EndpointResult<EndpointUsage> {
        let mut state = self.state.write().map_err(lock_error)?;
        let endpoint = state
            .endpoints
            .get_mut(&endpoint_id)
            .ok_or(EndpointRepositoryError::NotFound(endpoint_id))?;
        endpoint.record_invocation(status, latency_ms, at);
        Ok(endpoint.usage())
    }
}

#[async_trait]
impl BindingReferences for InMemoryEndpointRepository {
    async fn count_bindings_for_server(
        &self,
        server_id: ServerId,
    ) -> Result<usize, BindingReferenceError> {
        let state = self
            .state
            .read()
            .map_err(|err| BindingReferenceError::new(std::io::Error::other(err.to_string())))?;
        Ok(state
            .endpoints
            .values()
            .map(|endpoint| endpoint.count_bindings_for_server(server_id))
            .sum())
    }
}
