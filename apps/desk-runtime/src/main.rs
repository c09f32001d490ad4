//! Desk Runtime Binary
//!
//! Runs the desk headless: bootstraps every panel, keeps the live feeds
//! connected, persists preferences, and serves the desk snapshot over HTTP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin desk-runtime
//! ```
//!
//! # Environment Variables
//!
//! - `DESK_API_BASE_URL`: Desk API base URL (default: <http://localhost:3000>)
//! - `DESK_PUSH_URL`: Push endpoint (default: derived from the base URL)
//! - `DESK_SESSION_TOKEN`: Signs the desk in when set
//! - `DESK_HOSTING`: persistent | serverless (default: persistent; serverless always polls)
//! - `DESK_POLL_INTERVAL_SECS`, `DESK_SYNC_DEBOUNCE_MS`, and the other `DESK_*` tunables
//! - `DESK_LOCAL_STORE_PATH`: Guest preferences file (default: .desk/guest.json)
//! - `DESK_HTTP_PORT`: Snapshot/health/metrics port (default: 8090)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter (default: `desk_runtime=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use desk_runtime::application::ports::PushTransport;
use desk_runtime::infrastructure::telemetry;
use desk_runtime::{
    DeskApiClient, DeskConfig, DeskPorts, DeskRuntime, EventHub, HealthServer, HealthServerState,
    JsonFileStore, NoticeLevel, SharedEventHub, WsPushTransport, WsTransportConfig, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Upper bound on runtime shutdown before the process exits anyway.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("telemetry setup failed")?;

    tracing::info!("Starting desk runtime");

    let _metrics_handle = init_metrics().context("metrics recorder setup failed")?;

    let config = DeskConfig::from_env().context("invalid desk configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let api = Arc::new(DeskApiClient::new(&config.api).context("failed to build HTTP client")?);
    let push: Arc<dyn PushTransport> = Arc::new(WsPushTransport::new(
        WsTransportConfig::from_settings(&config.api, &config.feed),
    ));
    let ports = DeskPorts {
        panels: Arc::clone(&api) as _,
        context: Arc::clone(&api) as _,
        poller: Arc::clone(&api) as _,
        push: Some(push),
        profile: api,
        local: Arc::new(JsonFileStore::new(config.sync.local_store_path.clone())),
    };

    let events: SharedEventHub = Arc::new(EventHub::with_defaults());
    tokio::spawn(log_notices(Arc::clone(&events), shutdown_token.clone()));

    let http_port = config.server.http_port;
    let runtime = Arc::new(DeskRuntime::new(config, ports, events));

    let server_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&runtime),
    ));
    let server = HealthServer::new(http_port, Arc::clone(&server_state), shutdown_token.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "Desk HTTP server error");
        }
    });

    let report = runtime.start().await;
    if report.is_complete() {
        tracing::info!(panels = report.succeeded.len(), "Desk bootstrap complete");
    } else {
        tracing::warn!(
            loaded = report.succeeded.len(),
            failed = report.failed.len(),
            "Desk bootstrap finished with failed panels"
        );
    }
    server_state.mark_ready();

    tracing::info!("Desk runtime ready");

    await_shutdown().await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, runtime.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Runtime shutdown timed out"
        );
    }
    shutdown_token.cancel();
    let _ = server_handle.await;

    tracing::info!("Desk runtime stopped");
    Ok(())
}

/// Surface user-facing notices in the log.
async fn log_notices(events: SharedEventHub, cancel: CancellationToken) {
    let mut notices = events.notices();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            notice = notices.recv() => match notice {
                Ok(notice) => match notice.level {
                    NoticeLevel::Error => tracing::warn!(message = %notice.message, "Desk notice"),
                    NoticeLevel::Info | NoticeLevel::Success => {
                        tracing::info!(message = %notice.message, "Desk notice");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Notice log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &DeskConfig) {
    tracing::info!(
        hosting = config.hosting.as_str(),
        authenticated = config.is_authenticated(),
        push_enabled = config.feed.push_enabled,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.api.base_url,
        push_url = %config.api.push_url,
        local_store = %config.sync.local_store_path.display(),
        "Desk endpoints"
    );
}

/// Load .env from the current directory or the nearest ancestor holding one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
