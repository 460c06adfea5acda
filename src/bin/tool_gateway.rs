//! Runs the tool gateway HTTP server.
//!
//! Configuration is read from the environment (see
//! [`tool_gateway::config::GatewayConfig`]). Servers and catalog entries are
//! stored in `PostgreSQL` when `DATABASE_URL` is set and in memory otherwise;
//! endpoint definitions and execution records are kept in memory.

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use eyre::WrapErr;
use mockable::DefaultClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tool_gateway::{
    api,
    config::GatewayConfig,
    gateway::{
        adapters::memory::{InMemoryEndpointRepository, InMemoryRecordStore},
        services::{ExecutionEngine, RecordQueryService},
    },
    tool_registry::{
        adapters::{
            memory::{InMemoryCatalog, InMemoryServerRegistry},
            postgres::{PostgresCatalog, PostgresServerRegistry},
            transport::{HttpToolTransport, ProcessPipeTransport, TransportRouter},
        },
        domain::TransportKind,
        ports::{CatalogRepository, ServerRepository, ToolTransport},
        services::{CatalogService, HealthMonitor, ServerRegistryService},
    },
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = GatewayConfig::from_env().wrap_err("invalid gateway configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    match config.database_url.clone() {
        Some(url) => {
            let pool = Pool::builder()
                .build(ConnectionManager::<PgConnection>::new(url))
                .wrap_err("failed to connect to PostgreSQL")?;
            info!("using PostgreSQL server registry and catalog");
            run(
                &config,
                Arc::new(PostgresServerRegistry::new(pool.clone())),
                Arc::new(PostgresCatalog::new(pool)),
            )
            .await
        }
        None => {
            info!("using in-memory server registry and catalog");
            run(
                &config,
                Arc::new(InMemoryServerRegistry::new()),
                Arc::new(InMemoryCatalog::new()),
            )
            .await
        }
    }
}

async fn run<S, K>(config: &GatewayConfig, servers: Arc<S>, catalog: Arc<K>) -> eyre::Result<()>
where
    S: ServerRepository + 'static,
    K: CatalogRepository + 'static,
{
    let clock = Arc::new(DefaultClock);
    let http: Arc<dyn ToolTransport> = Arc::new(HttpToolTransport::new(config.degraded_latency));
    let transport = Arc::new(
        TransportRouter::new()
            .with_route(TransportKind::RequestResponse, Arc::clone(&http))
            .with_route(TransportKind::ServerPushStream, http)
            .with_route(
                TransportKind::ProcessPipe,
                Arc::new(ProcessPipeTransport::new(config.degraded_latency)),
            ),
    );
    let endpoints = Arc::new(InMemoryEndpointRepository::new());
    let records = Arc::new(InMemoryRecordStore::new());

    let registry = ServerRegistryService::new(
        Arc::clone(&servers),
        Arc::clone(&catalog),
        Arc::clone(&endpoints),
        Arc::clone(&transport),
        Arc::clone(&clock),
    )
    .with_probe_timeout(config.probe_timeout);
    let discovery = CatalogService::new(
        Arc::clone(&servers),
        Arc::clone(&catalog),
        Arc::clone(&transport),
        Arc::clone(&clock),
    );
    let sweep = discovery
        .discover_all()
        .await
        .wrap_err("initial catalog discovery failed")?;
    info!(
        refreshed = sweep.refreshed.len(),
        failed = sweep.failures.len(),
        "initial catalog discovery finished"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = tokio::spawn(
        HealthMonitor::new(registry, config.health_interval).run(shutdown_rx.clone()),
    );
    let pruning = tokio::spawn(prune_records(
        RecordQueryService::new(Arc::clone(&records), Arc::clone(&clock)),
        config.record_retention_days,
        shutdown_rx,
    ));

    let engine = ExecutionEngine::new(endpoints, servers, catalog, records, transport, clock);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "tool gateway listening");
    axum::serve(listener, api::router(Arc::new(engine)))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await
        .wrap_err("HTTP server failed")?;

    info!("shutting down");
    shutdown_tx.send_replace(true);
    monitor.await.wrap_err("health monitor task panicked")?;
    pruning.await.wrap_err("record pruning task panicked")?;
    Ok(())
}

async fn prune_records(
    service: RecordQueryService<InMemoryRecordStore, DefaultClock>,
    retention_days: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = service.prune_older_than(retention_days).await {
                    warn!(error = %err, "execution record pruning failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
