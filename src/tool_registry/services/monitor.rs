//! Periodic health checks across active tool servers.

use super::registry::{ServerRegistryService, ServerRegistryServiceError};
use crate::tool_registry::{
    domain::{ServerHealthStatus, ServerId},
    ports::{BindingReferences, CatalogRepository, ServerRepository, ToolTransport},
};
use mockable::Clock;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Tally of one health sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSweep {
    /// Servers probed during the sweep.
    pub probed: usize,
    /// Servers reported unhealthy.
    pub unhealthy: usize,
    /// Probes that failed to complete or persist.
    pub errors: usize,
}

/// Fixed-interval health loop.
///
/// Every tick probes each active server in its own task so one slow server
/// never delays the others.
pub struct HealthMonitor<R, K, B, T, C>
where
    R: ServerRepository + 'static,
    K: CatalogRepository + 'static,
    B: BindingReferences + 'static,
    T: ToolTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: ServerRegistryService<R, K, B, T, C>,
    interval: Duration,
}

impl<R, K, B, T, C> HealthMonitor<R, K, B, T, C>
where
    R: ServerRepository + 'static,
    K: CatalogRepository + 'static,
    B: BindingReferences + 'static,
    T: ToolTransport + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a monitor that sweeps every `interval`.
    #[must_use]
    pub const fn new(registry: ServerRegistryService<R, K, B, T, C>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Probes every active server once.
    ///
    /// # Errors
    ///
    /// Returns persistence errors when the server list cannot be read.
    pub async fn sweep(&self) -> Result<HealthSweep, ServerRegistryServiceError> {
        let servers = self.registry.list_all().await?;
        let mut probes = JoinSet::new();
        for server in servers.into_iter().filter(|server| server.is_active()) {
            let registry = self.registry.clone();
            let server_id = server.id();
            probes.spawn(async move { (server_id, registry.check_health(server_id).await) });
        }

        let mut tally = HealthSweep::default();
        while let Some(joined) = probes.join_next().await {
            tally.probed += 1;
            match joined {
                Ok((_, Ok(server))) => {
                    if server.health().status() == ServerHealthStatus::Unhealthy {
                        tally.unhealthy += 1;
                    }
                }
                Ok((server_id, Err(err))) => {
                    tally.errors += 1;
                    log_probe_error(server_id, &err);
                }
                Err(err) => {
                    tally.errors += 1;
                    warn!(error = %err, "health probe task aborted");
                }
            }
        }
        debug!(
            probed = tally.probed,
            unhealthy = tally.unhealthy,
            errors = tally.errors,
            "health sweep finished"
        );
        Ok(tally)
    }

    /// Runs sweeps until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "health monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        warn!(error = %err, "health sweep could not list servers");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("health monitor stopped");
    }
}

fn log_probe_error(server_id: ServerId, err: &ServerRegistryServiceError) {
    warn!(server_id = %server_id, error = %err, "health probe failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::{
        adapters::{
            ScriptedToolTransport,
            memory::{InMemoryCatalog, InMemoryServerRegistry},
        },
        domain::ServerTransport,
        ports::BindingReferenceError,
        services::RegisterServerRequest,
    };
    use async_trait::async_trait;
    use mockable::DefaultClock;
    use rstest::rstest;
    use std::sync::Arc;

    struct NoReferences;

    #[async_trait]
    impl BindingReferences for NoReferences {
        async fn count_bindings_for_server(
            &self,
            _server_id: ServerId,
        ) -> Result<usize, BindingReferenceError> {
            Ok(0)
        }
    }

    type TestRegistry = ServerRegistryService<
        InMemoryServerRegistry,
        InMemoryCatalog,
        NoReferences,
        ScriptedToolTransport,
        DefaultClock,
    >;

    fn registry(transport: Arc<ScriptedToolTransport>) -> TestRegistry {
        ServerRegistryService::new(
            Arc::new(InMemoryServerRegistry::new()),
            Arc::new(InMemoryCatalog::new()),
            Arc::new(NoReferences),
            transport,
            Arc::new(DefaultClock),
        )
        .with_probe_timeout(Duration::from_millis(200))
    }

    async fn register(registry: &TestRegistry, name: &str) -> ServerId {
        let url = format!("http://{name}.local");
        registry
            .register(RegisterServerRequest::new(
                name,
                ServerTransport::request_response(url).expect("valid url"),
            ))
            .await
            .expect("registration succeeds")
            .id()
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_probes_active_servers_only() {
        let transport = Arc::new(ScriptedToolTransport::new());
        let registry = registry(Arc::clone(&transport));
        let healthy = register(&registry, "alpha").await;
        let failing = register(&registry, "beta").await;
        let idle = register(&registry, "gamma").await;
        transport.set_unreachable(failing).expect("scripting succeeds");
        registry.set_active(idle, false).await.expect("deactivation succeeds");

        let monitor = HealthMonitor::new(registry.clone(), Duration::from_secs(60));
        let tally = monitor.sweep().await.expect("sweep runs");

        assert_eq!(
            tally,
            HealthSweep {
                probed: 2,
                unhealthy: 1,
                errors: 0
            }
        );
        let checked = registry
            .find_by_id(healthy)
            .await
            .expect("lookup succeeds")
            .expect("server exists");
        assert_eq!(checked.health().status(), ServerHealthStatus::Healthy);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn run_stops_on_shutdown_signal() {
        let transport = Arc::new(ScriptedToolTransport::new());
        let monitor = HealthMonitor::new(registry(transport), Duration::from_millis(10));
        let (sender, receiver) = watch::channel(false);

        let handle = tokio::spawn(monitor.run(receiver));
        tokio::time::sleep(Duration::from_millis(30)).await;
        sender.send(true).expect("monitor is listening");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor stops promptly")
            .expect("monitor task completes");
    }
}
