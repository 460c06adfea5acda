//! In-memory gateway wiring shared by integration and behaviour tests.

use std::sync::Arc;

use eyre::WrapErr;
use mockable::DefaultClock;
use serde_json::json;
use tool_gateway::{
    gateway::{
        adapters::memory::{InMemoryEndpointRepository, InMemoryRecordStore, InMemoryTestResults},
        services::{EndpointComposer, ExecutionEngine, RecordQueryService, ToolTestService},
    },
    tool_registry::{
        adapters::{
            ScriptedToolTransport,
            memory::{InMemoryCatalog, InMemoryServerRegistry},
        },
        domain::{CatalogEntry, ServerName, ServerTransport, ToolDefinition, ToolServer},
        services::{CatalogService, RegisterServerRequest, ServerRegistryService},
    },
};

pub type Registry = ServerRegistryService<
    InMemoryServerRegistry,
    InMemoryCatalog,
    InMemoryEndpointRepository,
    ScriptedToolTransport,
    DefaultClock,
>;
pub type Discovery =
    CatalogService<InMemoryServerRegistry, InMemoryCatalog, ScriptedToolTransport, DefaultClock>;
pub type Composer = EndpointComposer<InMemoryEndpointRepository, InMemoryCatalog, DefaultClock>;
pub type Engine = ExecutionEngine<
    InMemoryEndpointRepository,
    InMemoryServerRegistry,
    InMemoryCatalog,
    InMemoryRecordStore,
    ScriptedToolTransport,
    DefaultClock,
>;
pub type Records = RecordQueryService<InMemoryRecordStore, DefaultClock>;
pub type ToolTests = ToolTestService<
    InMemoryServerRegistry,
    InMemoryCatalog,
    ScriptedToolTransport,
    InMemoryTestResults,
    DefaultClock,
>;

/// Every gateway service wired to shared in-memory stores and a scripted
/// transport.
pub struct GatewayHarness {
    pub transport: Arc<ScriptedToolTransport>,
    pub registry: Registry,
    pub discovery: Discovery,
    pub composer: Composer,
    pub engine: Engine,
    pub records: Records,
    pub tool_tests: ToolTests,
}

impl Default for GatewayHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayHarness {
    pub fn new() -> Self {
        let clock = Arc::new(DefaultClock);
        let transport = Arc::new(ScriptedToolTransport::new());
        let servers = Arc::new(InMemoryServerRegistry::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let endpoints = Arc::new(InMemoryEndpointRepository::new());
        let records = Arc::new(InMemoryRecordStore::new());

        Self {
            registry: ServerRegistryService::new(
                Arc::clone(&servers),
                Arc::clone(&catalog),
                Arc::clone(&endpoints),
                Arc::clone(&transport),
                Arc::clone(&clock),
            ),
            discovery: CatalogService::new(
                Arc::clone(&servers),
                Arc::clone(&catalog),
                Arc::clone(&transport),
                Arc::clone(&clock),
            ),
            composer: EndpointComposer::new(
                Arc::clone(&endpoints),
                Arc::clone(&catalog),
                Arc::clone(&clock),
            ),
            records: RecordQueryService::new(Arc::clone(&records), Arc::clone(&clock)),
            tool_tests: ToolTestService::new(
                Arc::clone(&servers),
                Arc::clone(&catalog),
                Arc::clone(&transport),
                Arc::new(InMemoryTestResults::new()),
                Arc::clone(&clock),
            ),
            engine: ExecutionEngine::new(
                endpoints,
                servers,
                catalog,
                records,
                Arc::clone(&transport),
                clock,
            ),
            transport,
        }
    }

    /// Registers an HTTP tool server listing `tools` and discovers them.
    pub async fn register_server(
        &self,
        name: &str,
        tools: &[&str],
    ) -> Result<(ToolServer, Vec<CatalogEntry>), eyre::Report> {
        let listing = tools
            .iter()
            .map(|tool| ToolDefinition::new(*tool, json!({"type": "object"})))
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("tool definitions should be valid")?;
        self.transport
            .set_tool_catalog(ServerName::new(name)?, listing)
            .wrap_err("tool listing should be scripted")?;
        let server = self
            .registry
            .register(RegisterServerRequest::new(
                name,
                ServerTransport::request_response(format!("http://{name}.local/rpc"))?,
            ))
            .await
            .wrap_err("registration should succeed")?;
        let entries = self
            .discovery
            .discover(server.id())
            .await
            .wrap_err("discovery should succeed")?;
        Ok((server, entries))
    }

    /// Registers `weather_tools` with `geocode` and `forecast`.
    pub async fn register_weather_tools(
        &self,
    ) -> Result<(ToolServer, CatalogEntry, CatalogEntry), eyre::Report> {
        let (server, entries) = self.register_server("weather_tools", &["geocode", "forecast"]).await?;
        let find = |name: &str| {
            entries
                .iter()
                .find(|entry| entry.tool_name() == name)
                .cloned()
                .ok_or_else(|| eyre::eyre!("tool {name} should be cataloged"))
        };
        Ok((server, find("geocode")?, find("forecast")?))
    }
}
