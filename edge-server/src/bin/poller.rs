//! GlassMemo inbox poller.
//!
//! Periodically pulls unprocessed QQ messages from the edge API, files the
//! ones the classifier accepts as tasks, and marks each one processed. Runs
//! until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use glassmemo::{AcceptAll, Classifier, Config, EdgeClient, Poller, RelayClassifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("poller_starting");

    let config = Config::from_env();
    info!(
        edge_api_base = %config.edge_api_base,
        poll_interval_ms = config.poll_interval_ms,
        ai_api_key_configured = config.ali_api_key.is_some(),
        ai_model = %config.ai_model,
        "config_loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let client =
        EdgeClient::new(http, &config.edge_api_base).context("Invalid EDGE_API_BASE")?;

    let classifier: Arc<dyn Classifier> = match config.ali_api_key.clone() {
        Some(api_key) => Arc::new(RelayClassifier::new(client.clone(), api_key, &config.ai_model)),
        None => {
            warn!("ai_api_key_missing_accepting_all_messages");
            Arc::new(AcceptAll)
        }
    };

    let interval = Duration::from_millis(config.poll_interval_ms);
    let handle = Poller::new(client, classifier, interval).spawn();

    shutdown_signal().await;
    handle.stop().await;

    info!("poller_shutdown_complete");

    Ok(())
}

/// Completes when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
