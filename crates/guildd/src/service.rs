//! Service mode: the hello endpoint plus its control loops.
//!
//! In this mode, the daemon:
//! 1. Opens the state store and seeds the greeting parameter if configured
//! 2. Warms the handler pool to the controller's starting capacity
//! 3. Runs the metrics, autoscaler, and health-monitor loops
//! 4. Serves the gateway until Ctrl-C, then drains the loops

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};

use guild_api::ApiState;
use guild_autoscale::{Autoscaler, BoxFuture, ScaleCallback};
use guild_core::ServiceConfig;
use guild_greeter::{ConfigResolver, Greeter};
use guild_health::{HealthMonitor, log_notifier, webhook_notifier};
use guild_metrics::MetricsCollector;
use guild_runtime::WarmPool;
use guild_state::{ReadGrant, StateStore};

/// Run the hello service until shutdown.
pub async fn run_service(config: ServiceConfig, port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    info!(
        service = %config.service.name,
        environment = %config.service.environment,
        version = %config.service.version,
        "guild daemon starting"
    );
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("guild.redb");

    // ── State store ──────────────────────────────────────────────
    let state = StateStore::open(&db_path)
        .with_context(|| format!("opening state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");

    let key = &config.greeting.parameter;
    if let Some(seed) = &config.greeting.seed_template
        && state.get_parameter(key)?.is_none()
    {
        state.put_parameter(key, seed)?;
        info!(%key, "greeting parameter seeded");
    }

    // ── Warm pool ────────────────────────────────────────────────
    // Handlers may read only the greeting parameter.
    let grant = ReadGrant::new(state.clone(), [key.clone()]);
    let greeter = Greeter::new(
        ConfigResolver::from_config(Arc::new(grant), &config.greeting),
        &config.greeting.default_name,
    );
    let pool = WarmPool::new(Arc::new(move || Ok(greeter.clone())));

    let period = config.metrics.period;

    // ── Autoscaler ───────────────────────────────────────────────
    let scale_pool = Arc::clone(&pool);
    let scale_fn: ScaleCallback = Arc::new(move |target: u32| -> BoxFuture {
        let pool = Arc::clone(&scale_pool);
        Box::pin(async move { tokio::task::spawn_blocking(move || pool.resize(target)).await? })
    });
    let mut autoscaler = Autoscaler::new(state.clone(), &config.scaling, period)?.with_scale_fn(scale_fn);

    let initial = autoscaler.pool().current_capacity();
    pool.resize(initial)?;
    info!(capacity = initial, "warm pool provisioned");

    // ── Metrics collector ────────────────────────────────────────
    let probe_pool = Arc::clone(&pool);
    let metrics = Arc::new(
        MetricsCollector::new(state.clone(), period)
            .with_retention(config.metrics.retention_periods)
            .with_concurrency_probe(Arc::new(move || probe_pool.take_reading())),
    );

    // ── Health monitor ───────────────────────────────────────────
    let mut monitor = HealthMonitor::new(
        state.clone(),
        &config.alarms,
        period,
        config.service.environment.clone(),
    )?
    .with_notifier(log_notifier());
    if let Some(url) = &config.notify.webhook_url {
        monitor = monitor.with_notifier(webhook_notifier(url, config.notify.timeout)?);
        info!(%url, "alarm webhook enabled");
    }

    // ── Shutdown signal ──────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ─────────────────────────────────────────
    let metrics_loop = Arc::clone(&metrics);
    let metrics_shutdown = shutdown_rx.clone();
    let metrics_handle = tokio::spawn(async move {
        metrics_loop.run(metrics_shutdown).await;
    });

    let autoscale_shutdown = shutdown_rx.clone();
    let autoscale_handle = tokio::spawn(async move {
        autoscaler.run(autoscale_shutdown).await;
    });

    let monitor_handle = tokio::spawn(async move {
        monitor.run(shutdown_rx).await;
    });

    // ── Gateway ──────────────────────────────────────────────────
    let router = guild_api::build_router(ApiState {
        store: state,
        pool,
        metrics,
        service: config.service.clone(),
        invocation_timeout: config.invocation_timeout(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "gateway starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    for (name, handle) in [
        ("metrics", metrics_handle),
        ("autoscaler", autoscale_handle),
        ("health monitor", monitor_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }

    info!("guild daemon stopped");
    Ok(())
}
