//! Server registration and health persistence against `PostgreSQL`.

use crate::postgres::helpers::{
    CleanupGuard, clock, ensure_template, server, setup_repositories, test_runtime,
};
use mockable::{Clock, DefaultClock};
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use std::collections::BTreeMap;
use tool_gateway::tool_registry::{
    domain::{AuthConfig, ServerHealthSnapshot, ServerHealthStatus, ServerId, ServerName},
    ports::{ServerRegistryError, ServerRepository},
};

#[rstest]
fn registered_server_is_found_by_id_and_name(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_server_find_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    let stored = server(&clock, "weather_tools", "http://weather.local/rpc")
        .with_auth(AuthConfig::Headers {
            headers: BTreeMap::from([("x-api-key".to_owned(), "secret".to_owned())]),
        });
    rt.block_on(repos.servers.register(&stored))
        .expect("register");

    let by_id = rt
        .block_on(repos.servers.find_by_id(stored.id()))
        .expect("find_by_id")
        .expect("server exists");
    let by_name = rt
        .block_on(
            repos
                .servers
                .find_by_name(&ServerName::new("weather_tools").expect("valid name")),
        )
        .expect("find_by_name")
        .expect("server exists");

    assert_eq!(by_id.id(), stored.id());
    assert_eq!(by_id.name(), stored.name());
    assert_eq!(by_id.address(), "http://weather.local/rpc");
    assert_eq!(by_id.auth(), stored.auth());
    assert_eq!(by_name.id(), stored.id());
}

#[rstest]
fn duplicate_name_and_address_are_rejected(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_server_dup_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    rt.block_on(
        repos
            .servers
            .register(&server(&clock, "weather_tools", "http://weather.local/rpc")),
    )
    .expect("register");

    let same_name = rt.block_on(
        repos
            .servers
            .register(&server(&clock, "weather_tools", "http://other.local/rpc")),
    );
    let same_address = rt.block_on(
        repos
            .servers
            .register(&server(&clock, "other_tools", "http://weather.local/rpc")),
    );

    assert!(matches!(
        same_name,
        Err(ServerRegistryError::DuplicateServerName(_))
    ));
    assert!(matches!(
        same_address,
        Err(ServerRegistryError::DuplicateServerAddress(_))
    ));
}

#[rstest]
fn update_persists_activation_and_capabilities(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_server_update_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    let registered = server(&clock, "weather_tools", "http://weather.local/rpc");
    rt.block_on(repos.servers.register(&registered))
        .expect("register");

    let mut changed = registered
        .with_capabilities(["forecast".to_owned()])
        .expect("valid capabilities");
    changed.set_active(false, &clock);
    rt.block_on(repos.servers.update(&changed)).expect("update");

    let reloaded = rt
        .block_on(repos.servers.find_by_id(changed.id()))
        .expect("find_by_id")
        .expect("server exists");
    assert!(!reloaded.is_active());
    assert_eq!(reloaded.capabilities(), ["forecast".to_owned()]);
}

#[rstest]
fn update_of_missing_server_is_not_found(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_server_missing_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    let unsaved = server(&clock, "weather_tools", "http://weather.local/rpc");
    let result = rt.block_on(repos.servers.update(&unsaved));

    assert!(matches!(result, Err(ServerRegistryError::NotFound(id)) if id == unsaved.id()));
}

#[rstest]
fn health_write_only_touches_health_columns(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_server_health_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    let registered = server(&clock, "weather_tools", "http://weather.local/rpc");
    rt.block_on(repos.servers.register(&registered))
        .expect("register");

    let before = rt
        .block_on(repos.servers.find_by_id(registered.id()))
        .expect("find_by_id")
        .expect("server exists");

    let snapshot = ServerHealthSnapshot::degraded(clock.utc(), "slow");
    let updated = rt
        .block_on(repos.servers.update_health(registered.id(), &snapshot))
        .expect("health stored");

    assert_eq!(updated.health().status(), ServerHealthStatus::Degraded);
    assert_eq!(updated.health().message(), Some("slow"));
    assert!(updated.is_active());
    assert_eq!(updated.updated_at(), before.updated_at());
}

#[rstest]
fn health_write_is_dropped_for_inactive_server(
    clock: DefaultClock,
    shared_test_cluster: &'static TestCluster,
) {
    ensure_template(shared_test_cluster).expect("template setup");
    let db_name = format!("test_server_inactive_{}", uuid::Uuid::new_v4());
    let _guard = CleanupGuard::new(shared_test_cluster, db_name.clone());
    let repos = setup_repositories(shared_test_cluster, &db_name, 1).expect("repository setup");
    let rt = test_runtime();

    let mut registered = server(&clock, "weather_tools", "http://weather.local/rpc");
    rt.block_on(repos.servers.register(&registered))
        .expect("register");
    registered.set_active(false, &clock);
    rt.block_on(repos.servers.update(&registered))
        .expect("deactivate");

    let snapshot = ServerHealthSnapshot::healthy(clock.utc());
    let stored = rt
        .block_on(repos.servers.update_health(registered.id(), &snapshot))
        .expect("lookup succeeds");

    assert!(!stored.is_active());
    assert_eq!(stored.health().status(), ServerHealthStatus::Unknown);

    let missing = rt.block_on(repos.servers.update_health(ServerId::new(), &snapshot));
    assert!(matches!(missing, Err(ServerRegistryError::NotFound(_))));
}
