//! Ad-hoc tool test runs against discovered catalog entries.

use crate::test_helpers::GatewayHarness;
use rstest::{fixture, rstest};
use serde_json::json;
use tool_gateway::{
    gateway::domain::{Expression, TestCase, TestStatus},
    tool_registry::adapters::ScriptedResponse,
};

#[fixture]
fn harness() -> GatewayHarness {
    GatewayHarness::new()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn test_runs_leave_usage_statistics_alone(harness: GatewayHarness) {
    let (_, geocode, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    harness
        .transport
        .push_response(
            "geocode",
            ScriptedResponse::Success(json!({"lat": 48.85, "lon": 2.35})),
        )
        .expect("response queued");
    let case = TestCase::new("paris", json!({"city": "Paris"}))
        .expecting(json!({"lat": 48.85, "lon": 2.35}))
        .asserting(Expression::parse_condition("output.lat > 40").expect("valid assertion"));

    let result = harness
        .tool_tests
        .run(geocode.id(), &case)
        .await
        .expect("test runs");

    assert_eq!(result.status, TestStatus::Passed);
    let entry = harness
        .discovery
        .find_by_id(geocode.id())
        .await
        .expect("lookup succeeds")
        .expect("entry exists");
    assert_eq!(entry.stats().usage_count, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_is_reported_as_error(harness: GatewayHarness) {
    let (server, geocode, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    harness
        .transport
        .set_unreachable(server.id())
        .expect("server scripted");

    let result = harness
        .tool_tests
        .run(geocode.id(), &TestCase::new("offline", json!({})))
        .await
        .expect("result stored");

    assert_eq!(result.status, TestStatus::Error);
    assert!(result.actual.is_none());
    assert!(result.error.is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stored_runs_are_listed_oldest_first(harness: GatewayHarness) {
    let (_, geocode, _) = harness
        .register_weather_tools()
        .await
        .expect("weather tools registered");
    for name in ["first", "second"] {
        harness
            .tool_tests
            .run(geocode.id(), &TestCase::new(name, json!({"city": name})))
            .await
            .expect("test runs");
    }

    let runs = harness
        .tool_tests
        .list_for_entry(geocode.id())
        .await
        .expect("runs listed");

    let names: Vec<_> = runs.iter().map(|run| run.test_name.as_str()).collect();
    assert_eq!(names, ["first", "second"]);
}
