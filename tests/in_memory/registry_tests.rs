//! Server registration, discovery and health probing over in-memory stores.

use crate::test_helpers::GatewayHarness;
use rstest::{fixture, rstest};
use serde_json::json;
use std::collections::BTreeMap;
use tool_gateway::tool_registry::{
    domain::{CatalogEntry, CatalogEntryId, ServerHealthStatus, ServerName, ServerTransport, ToolDefinition},
    ports::ServerRegistryError,
    services::{CatalogServiceError, RegisterServerRequest, ServerRegistryServiceError},
};

#[fixture]
fn harness() -> GatewayHarness {
    GatewayHarness::new()
}

fn identities(entries: &[CatalogEntry]) -> BTreeMap<String, (CatalogEntryId, String)> {
    entries
        .iter()
        .map(|entry| {
            (
                entry.tool_name().to_owned(),
                (entry.id(), entry.schema_digest().to_owned()),
            )
        })
        .collect()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rediscovery_keeps_entry_identities(harness: GatewayHarness) {
    let (server, first) = harness
        .register_server("weather_tools", &["geocode", "forecast"])
        .await
        .expect("server registered");

    let second = harness
        .discovery
        .discover(server.id())
        .await
        .expect("rediscovery succeeds");

    assert_eq!(identities(&first), identities(&second));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn withdrawn_tools_stay_cataloged_but_unavailable(harness: GatewayHarness) {
    let (server, _) = harness
        .register_server("weather_tools", &["geocode", "forecast"])
        .await
        .expect("server registered");
    let listing = vec![ToolDefinition::new("geocode", json!({"type": "object"})).expect("valid")];
    harness
        .transport
        .set_tool_catalog(ServerName::new("weather_tools").expect("valid name"), listing)
        .expect("listing scripted");

    let entries = harness
        .discovery
        .discover(server.id())
        .await
        .expect("rediscovery succeeds");

    let forecast = entries
        .iter()
        .find(|entry| entry.tool_name() == "forecast")
        .expect("forecast kept");
    assert!(!forecast.is_available());
    assert_eq!(entries.len(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_server_name_is_rejected(harness: GatewayHarness) {
    harness
        .register_server("weather_tools", &["geocode"])
        .await
        .expect("server registered");

    let result = harness
        .registry
        .register(RegisterServerRequest::new(
            "weather_tools",
            ServerTransport::request_response("http://other.local/rpc").expect("valid url"),
        ))
        .await;

    assert!(matches!(
        result,
        Err(ServerRegistryServiceError::Repository(
            ServerRegistryError::DuplicateServerName(_)
        ))
    ));
}

#[rstest]
#[case(None, ServerHealthStatus::Healthy)]
#[case(Some("maintenance window"), ServerHealthStatus::Unhealthy)]
#[tokio::test(flavor = "multi_thread")]
async fn health_probe_updates_snapshot(
    harness: GatewayHarness,
    #[case] failure: Option<&str>,
    #[case] expected: ServerHealthStatus,
) {
    let (server, _) = harness
        .register_server("weather_tools", &["geocode"])
        .await
        .expect("server registered");
    assert_eq!(server.health().status(), ServerHealthStatus::Unknown);
    if let Some(message) = failure {
        harness
            .transport
            .set_unhealthy(server.id(), message)
            .expect("probe scripted");
    }

    let probed = harness
        .registry
        .check_health(server.id())
        .await
        .expect("probe recorded");

    assert_eq!(probed.health().status(), expected);
    let stored = harness
        .registry
        .find_by_id(server.id())
        .await
        .expect("lookup succeeds")
        .expect("server exists");
    assert_eq!(stored.health().status(), expected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_fails_discovery_without_touching_catalog(harness: GatewayHarness) {
    let (server, entries) = harness
        .register_server("weather_tools", &["geocode"])
        .await
        .expect("server registered");
    harness
        .transport
        .set_unreachable(server.id())
        .expect("server scripted");

    let result = harness.discovery.discover(server.id()).await;

    assert!(matches!(result, Err(CatalogServiceError::Transport(_))));
    let remaining = harness
        .discovery
        .list_for_server(server.id())
        .await
        .expect("catalog readable");
    assert_eq!(remaining, entries);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deregistering_unreferenced_server_purges_catalog(harness: GatewayHarness) {
    let (server, _) = harness
        .register_server("weather_tools", &["geocode"])
        .await
        .expect("server registered");

    harness
        .registry
        .deregister(server.id())
        .await
        .expect("deregistration succeeds");

    assert!(
        harness
            .discovery
            .list_for_server(server.id())
            .await
            .expect("catalog readable")
            .is_empty()
    );
    assert!(
        harness
            .registry
            .find_by_name("weather_tools")
            .await
            .expect("lookup succeeds")
            .is_none()
    );
}
