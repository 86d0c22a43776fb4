use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use notify_bridge::channels::ChannelDispatcher;
use notify_bridge::config::{BridgeConfig, DeliveryMode};
use notify_bridge::ingest::IngestionStatus;
use notify_bridge::pipeline::rate_limit::spawn_purge_task;
use notify_bridge::pipeline::{Channel, NotificationOrchestrator, OrchestratorDeps};
use notify_bridge::policy::{ConfigLookup, HttpConfigClient, HttpPreferenceClient};
use notify_bridge::server::{AppState, bridge_routes};

/// How often expired rate-limit windows are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env().context("Invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref());

    let mode = config.delivery_mode();
    eprintln!("📣 Notify Bridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mode: {}", mode.label());
    eprintln!("   Config service: {}", config.config_service_url);
    eprintln!("   User preferences: {}", config.user_preferences_url);
    eprintln!("   HTTP: http://0.0.0.0:{}/novu-bridge", config.server_port);

    // ── Lookups ─────────────────────────────────────────────────────────
    let timeout = config.http_timeout;
    let config_lookup: Arc<dyn ConfigLookup> = Arc::new(HttpConfigClient::new(
        config.config_service_url.clone(),
        timeout,
    )?);
    let preferences = Arc::new(HttpPreferenceClient::new(
        config.user_preferences_url.clone(),
        timeout,
    )?);

    // ── Delivery strategy ───────────────────────────────────────────────
    match mode {
        DeliveryMode::NovuTemplates | DeliveryMode::NovuDirect => {
            eprintln!("   Novu: {}", config.novu_api_url);
        }
        DeliveryMode::BaileysDirect => eprintln!("   Baileys: {}", config.baileys_provider_url),
        DeliveryMode::DryRun => eprintln!("   Transport: none (messages are simulated)"),
    }
    let dispatcher = ChannelDispatcher::from_config(mode, &config, Arc::clone(&config_lookup))
        .context("Failed to set up delivery")?;

    // ── Orchestrator ────────────────────────────────────────────────────
    let deps = OrchestratorDeps::new(config_lookup, preferences, Arc::new(dispatcher));
    let orchestrator = Arc::new(NotificationOrchestrator::new(
        deps,
        Channel::WhatsApp,
        config.default_tenant_utc_offset_minutes,
    ));
    let _purge_handle = spawn_purge_task(Arc::clone(orchestrator.rate_limiter()), PURGE_INTERVAL);

    // ── Ingestion ───────────────────────────────────────────────────────
    let ingestion_status = Arc::new(IngestionStatus::default());

    #[cfg(feature = "kafka")]
    let ingestion: Option<(JoinHandle<()>, Arc<AtomicBool>)> = {
        use notify_bridge::ingest::{IngestionLoop, KafkaSource};

        eprintln!(
            "   Kafka: {} (topics: {})",
            config.kafka.brokers.join(","),
            config.kafka.topics.join(", ")
        );
        let ingestion = IngestionLoop::new(
            Arc::new(KafkaSource::new(config.kafka.clone())),
            Arc::clone(&orchestrator),
            config.default_tenant_id.clone(),
        )
        .with_status(Arc::clone(&ingestion_status))
        .spawn();
        Some(ingestion)
    };

    #[cfg(not(feature = "kafka"))]
    let ingestion: Option<(JoinHandle<()>, Arc<AtomicBool>)> = {
        eprintln!("   Kafka: disabled (built without the `kafka` feature)");
        None
    };

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = bridge_routes(AppState {
        orchestrator,
        ingestion: ingestion_status,
        novu_configured: config.novu_api_key.is_some(),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!(port = config.server_port, "Notify bridge listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // HTTP is drained; let the record in flight finish and commit.
    if let Some((handle, shutdown)) = ingestion {
        shutdown.store(true, Ordering::Relaxed);
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Ingestion task ended abnormally");
        }
    }
    tracing::info!("Notify bridge stopped");

    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown requested");
}

/// Stderr logging, plus a daily-rolling file when a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "notify-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
