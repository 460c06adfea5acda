//! End-to-end endpoint invocations over in-memory stores.

use crate::test_helpers::GatewayHarness;
use chrono::{TimeDelta, Utc};
use futures::future::join_all;
use rstest::{fixture, rstest};
use serde_json::json;
use tool_gateway::{
    gateway::{
        domain::{Endpoint, ErrorKind, ExecutionStatus, RecordStatus},
        services::{AddBindingRequest, CreateEndpointRequest, TargetSpec},
    },
    tool_registry::adapters::ScriptedResponse,
};

#[fixture]
fn harness() -> GatewayHarness {
    GatewayHarness::new()
}

async fn weather_endpoint(harness: &GatewayHarness) -> Endpoint {
    let (_, geocode, forecast) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(CreateEndpointRequest::new("weather-lookup", "weather"))
        .await
        .expect("endpoint created");
    harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(geocode.id()), "geo", 0)
                .map("city", "input.city"),
        )
        .await
        .expect("geo binding added");
    harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(forecast.id()), "forecast", 1)
                .map("lat", "geo.output.lat")
                .map("lon", "geo.output.lon"),
        )
        .await
        .expect("forecast binding added");
    harness
        .composer
        .activate(endpoint.id())
        .await
        .expect("endpoint activated")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn weather_lookup_returns_every_binding(harness: GatewayHarness) {
    let endpoint = weather_endpoint(&harness).await;
    harness
        .transport
        .push_response(
            "geocode",
            ScriptedResponse::Success(json!({"lat": 48.85, "lon": 2.35})),
        )
        .expect("response queued");
    harness
        .transport
        .push_response("forecast", ScriptedResponse::Success(json!({"temp_c": 18})))
        .expect("response queued");

    let outcome = harness
        .engine
        .execute("/weather", json!({"city": "Paris"}), None)
        .await
        .expect("execution runs");

    assert_eq!(outcome.status, ExecutionStatus::Completed);
    assert_eq!(
        outcome.bindings.get("forecast").and_then(|forecast| forecast.output.clone()),
        Some(json!({"temp_c": 18}))
    );
    let now = Utc::now();
    let records = harness
        .records
        .list_by_endpoint(endpoint.id(), now - TimeDelta::minutes(1), now + TimeDelta::minutes(1))
        .await
        .expect("records listed");
    let tools: Vec<_> = records.iter().map(|record| record.tool_name()).collect();
    assert_eq!(tools, ["geocode", "forecast"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_probe_short_circuits_later_invocations(harness: GatewayHarness) {
    weather_endpoint(&harness).await;
    let server = harness
        .registry
        .find_by_name("weather_tools")
        .await
        .expect("lookup succeeds")
        .expect("server registered");
    harness
        .transport
        .set_unhealthy(server.id(), "maintenance")
        .expect("probe scripted");
    harness
        .registry
        .check_health(server.id())
        .await
        .expect("probe recorded");

    let outcome = harness
        .engine
        .execute("weather-lookup", json!({"city": "Paris"}), None)
        .await
        .expect("execution runs");

    assert_eq!(outcome.status, ExecutionStatus::Failed);
    let geo = outcome.bindings.get("geo").expect("geo reported");
    assert_eq!(
        geo.error.as_ref().map(|detail| detail.kind),
        Some(ErrorKind::UpstreamUnavailable)
    );
    assert!(harness.transport.invocations().expect("invocations").is_empty());
    let records = harness
        .records
        .list_by_execution(outcome.execution_id)
        .await
        .expect("records listed");
    assert_eq!(
        records.iter().map(|record| record.status()).collect::<Vec<_>>(),
        [RecordStatus::Failed]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_invocations_are_counted_exactly(harness: GatewayHarness) {
    let endpoint = weather_endpoint(&harness).await;
    for _ in 0..16 {
        harness
            .transport
            .push_response("geocode", ScriptedResponse::Success(json!({"lat": 1.0, "lon": 2.0})))
            .expect("response queued");
    }
    let calls = (0..16).map(|index| {
        harness
            .engine
            .execute("weather", json!({"city": format!("city-{index}")}), None)
    });

    let outcomes = join_all(calls).await;

    assert!(outcomes
        .iter()
        .all(|outcome| outcome.as_ref().is_ok_and(|o| o.status == ExecutionStatus::Completed)));
    let stored = harness.composer.get(endpoint.id()).await.expect("endpoint exists");
    assert_eq!(stored.usage().invocations, 16);
    assert_eq!(stored.usage().completed, 16);
    let geocode = harness
        .discovery
        .find_by_tool(endpoint.bindings()[0].target().server_id(), "geocode")
        .await
        .expect("lookup succeeds")
        .expect("entry exists");
    assert_eq!(geocode.stats().usage_count, 16);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deactivated_endpoint_is_not_invocable(harness: GatewayHarness) {
    let endpoint = weather_endpoint(&harness).await;
    harness
        .composer
        .deactivate(endpoint.id())
        .await
        .expect("endpoint deactivated");

    let result = harness.engine.execute("weather", json!({}), None).await;

    assert_eq!(result.map_err(|err| err.kind()).err(), Some("inactive"));
}
