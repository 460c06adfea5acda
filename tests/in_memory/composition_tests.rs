//! Endpoint composition against a discovered catalog.

use crate::test_helpers::GatewayHarness;
use rstest::{fixture, rstest};
use serde_json::json;
use tool_gateway::gateway::{
    domain::{EndpointStatus, GatewayDomainError},
    services::{AddBindingRequest, CreateEndpointRequest, EndpointComposerError, TargetSpec},
};

#[fixture]
fn harness() -> GatewayHarness {
    GatewayHarness::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn forward_reference_is_rejected(harness: GatewayHarness) {
    let (_, geocode, forecast) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(CreateEndpointRequest::new("weather", "weather"))
        .await
        .expect("endpoint created");
    harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(geocode.id()), "geo", 1),
        )
        .await
        .expect("geo binding added");

    let result = harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(forecast.id()), "forecast", 1)
                .map("lat", "geo.output.lat"),
        )
        .await;

    assert!(matches!(
        result,
        Err(EndpointComposerError::Validation(GatewayDomainError::ForwardReference { .. }))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reordering_into_a_forward_reference_is_rejected(harness: GatewayHarness) {
    let (_, geocode, forecast) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(CreateEndpointRequest::new("weather", "weather"))
        .await
        .expect("endpoint created");
    let geo = harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(geocode.id()), "geo", 0),
        )
        .await
        .expect("geo binding added");
    harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(forecast.id()), "forecast", 1)
                .map("lat", "geo.output.lat"),
        )
        .await
        .expect("forecast binding added");

    let result = harness
        .composer
        .update_binding_order(endpoint.id(), geo.id(), 5)
        .await;

    assert!(result.is_err_and(|err| err.is_validation()));
    let stored = harness.composer.get(endpoint.id()).await.expect("endpoint exists");
    let aliases: Vec<_> = stored.bindings().iter().map(|binding| binding.alias()).collect();
    assert_eq!(aliases, ["geo", "forecast"]);
}

#[rstest]
#[case("input.city", true)]
#[case("input.country", false)]
#[tokio::test(flavor = "multi_thread")]
async fn input_shape_limits_readable_fields(
    harness: GatewayHarness,
    #[case] expression: &str,
    #[case] accepted: bool,
) {
    let (_, geocode, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(
            CreateEndpointRequest::new("weather", "weather").with_input_shape(json!({
                "type": "object",
                "properties": {"city": {"type": "string"}}
            })),
        )
        .await
        .expect("endpoint created");

    let result = harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(geocode.id()), "geo", 0)
                .map("city", expression),
        )
        .await;

    assert_eq!(result.is_ok(), accepted);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn raw_target_is_resolved_at_activation(harness: GatewayHarness) {
    let (server, _, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(CreateEndpointRequest::new("weather", "weather"))
        .await
        .expect("endpoint created");
    harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(
                TargetSpec::Raw {
                    server_id: server.id(),
                    tool_name: "geocode".to_owned(),
                },
                "geo",
                0,
            ),
        )
        .await
        .expect("raw binding added");

    let active = harness
        .composer
        .activate(endpoint.id())
        .await
        .expect("activation succeeds");

    assert_eq!(active.status(), EndpointStatus::Active);
    assert!(active.bindings().iter().all(|binding| matches!(
        binding.target(),
        tool_gateway::gateway::domain::BindingTarget::Catalog { .. }
    )));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn required_binding_to_unknown_tool_blocks_activation(harness: GatewayHarness) {
    let (server, _, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(CreateEndpointRequest::new("weather", "weather"))
        .await
        .expect("endpoint created");
    harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(
                TargetSpec::Raw {
                    server_id: server.id(),
                    tool_name: "tides".to_owned(),
                },
                "tides",
                0,
            ),
        )
        .await
        .expect("raw binding added");

    let result = harness.composer.activate(endpoint.id()).await;

    assert!(matches!(
        result,
        Err(EndpointComposerError::Validation(GatewayDomainError::UnavailableTarget(_)))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn referenced_server_cannot_be_deregistered(harness: GatewayHarness) {
    let (server, geocode, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    let endpoint = harness
        .composer
        .create_endpoint(CreateEndpointRequest::new("weather", "weather"))
        .await
        .expect("endpoint created");
    let binding = harness
        .composer
        .add_binding(
            endpoint.id(),
            AddBindingRequest::new(TargetSpec::Catalog(geocode.id()), "geo", 0),
        )
        .await
        .expect("binding added");

    let blocked = harness.registry.deregister(server.id()).await;
    assert!(blocked.is_err());

    harness
        .composer
        .remove_binding(endpoint.id(), binding.id())
        .await
        .expect("binding removed");
    harness
        .registry
        .deregister(server.id())
        .await
        .expect("unreferenced server is removed");
}
