//! Catalog persistence and usage statistics against `PostgreSQL`.

use crate::postgres::helpers::{
    CleanupGuard, clock, ensure_template, server, setup_repositories, test_runtime,
};
use futures::future::join_all;
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use serde_json::json;
use tool_gateway::tool_registry::{
    domain::{CatalogEntry, ToolDefinition, UsageSample},
    ports::{CatalogRepository, ServerRepository},
};

#[rstest]
fn upsert_refreshes_definition_and_keeps_statistics(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_catalog_upsert_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    let owner = server(&clock, "weather_tools", "http://weather.local/rpc");
    rt.block_on(repos.servers.register(&owner)).expect("register");
    let definition = ToolDefinition::new("geocode", json!({"type": "object"})).expect("valid tool");
    let entry = CatalogEntry::discovered(owner.id(), &definition, &clock);
    rt.block_on(repos.catalog.upsert(&entry)).expect("insert");
    rt.block_on(
        repos
            .catalog
            .record_usage(entry.id(), UsageSample::new(40.0, true).expect("valid sample")),
    )
    .expect("record usage");

    rt.block_on(repos.catalog.upsert(&entry)).expect("refresh");

    let reloaded = rt
        .block_on(repos.catalog.find_by_id(entry.id()))
        .expect("find_by_id")
        .expect("entry exists");
    assert_eq!(reloaded.stats().usage_count, 1);
    assert_eq!(reloaded.tool_name(), "geocode");
}

#[rstest]
fn concurrent_usage_recording_counts_every_sample(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    const SAMPLES: u64 = 24;

    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_catalog_usage_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 4).expect("repository setup");
    let rt = test_runtime();

    let owner = server(&clock, "weather_tools", "http://weather.local/rpc");
    rt.block_on(repos.servers.register(&owner)).expect("register");
    let definition = ToolDefinition::new("geocode", json!({"type": "object"})).expect("valid tool");
    let entry = CatalogEntry::discovered(owner.id(), &definition, &clock);
    rt.block_on(repos.catalog.upsert(&entry)).expect("insert");

    let recordings = (0..SAMPLES).map(|index| {
        let sample = UsageSample::new(10.0, index.is_multiple_of(2)).expect("valid sample");
        repos.catalog.record_usage(entry.id(), sample)
    });
    let results = rt.block_on(join_all(recordings));
    assert!(results.iter().all(Result::is_ok));

    let stats = rt
        .block_on(repos.catalog.find_by_id(entry.id()))
        .expect("find_by_id")
        .expect("entry exists")
        .stats();
    assert_eq!(stats.usage_count, SAMPLES);
    assert!((stats.success_rate - 50.0).abs() < 1e-9);
    assert!((stats.avg_latency_ms - 10.0).abs() < 1e-9);
}
