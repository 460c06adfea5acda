//! Dispatch to the transport matching each server's configuration.

use crate::tool_registry::{
    domain::{ServerHealthSnapshot, ToolDefinition, ToolServer, TransportKind},
    ports::{ToolCall, ToolOutput, ToolTransport, ToolTransportError, ToolTransportResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes each call to the transport registered for the server's kind.
#[derive(Clone, Default)]
pub struct TransportRouter {
    routes: HashMap<TransportKind, Arc<dyn ToolTransport>>,
}

impl TransportRouter {
    /// Creates a router with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the transport serving `kind`, replacing any previous one.
    #[must_use]
    pub fn with_route(mut self, kind: TransportKind, transport: Arc<dyn ToolTransport>) -> Self {
        self.routes.insert(kind, transport);
        self
    }

    fn route(&self, server: &ToolServer) -> ToolTransportResult<&dyn ToolTransport> {
        let kind = server.transport().kind();
        self.routes
            .get(&kind)
            .map(|transport| transport.as_ref())
            .ok_or_else(|| ToolTransportError::UnsupportedTransport {
                server_id: server.id(),
                reason: format!("no transport registered for '{kind}'"),
            })
    }
}

impl std::fmt::Debug for TransportRouter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TransportRouter")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ToolTransport for TransportRouter {
    async fn list_tools(&self, server: &ToolServer) -> ToolTransportResult<Vec<ToolDefinition>> {
        self.route(server)?.list_tools(server).await
    }

    async fn invoke(&self, server: &ToolServer, call: &ToolCall) -> ToolTransportResult<ToolOutput> {
        self.route(server)?.invoke(server, call).await
    }

    async fn probe(&self, server: &ToolServer) -> ToolTransportResult<ServerHealthSnapshot> {
        self.route(server)?.probe(server).await
    }

    async fn cancel(&self, server: &ToolServer, call_id: &str) -> ToolTransportResult<()> {
        self.route(server)?.cancel(server, call_id).await
    }
}
