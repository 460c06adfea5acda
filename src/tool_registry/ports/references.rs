//! Port answering whether gateway bindings still depend on a server.

use crate::tool_registry::domain::ServerId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Lookup of bindings that reference a server's tools.
#[async_trait]
pub trait BindingReferences: Send + Sync {
    /// Returns how many bindings target the server, either through one of its
    /// catalog entries or through a raw server/tool pair.
    async fn count_bindings_for_server(
        &self,
        server_id: ServerId,
    ) -> Result<usize, BindingReferenceError>;
}

/// Failure while looking up binding references.
#[derive(Debug, Clone, Error)]
#[error("binding reference lookup failed: {0}")]
pub struct BindingReferenceError(pub Arc<dyn std::error::Error + Send + Sync>);

impl BindingReferenceError {
    /// Wraps an underlying lookup failure.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}
