// monitor/src/main.rs

//! Qtum (qtumd) monitor binary.
//!
//! Wires up the exporter library:
//!
//! - configuration from environment variables,
//! - Prometheus metrics exporter on `/metrics`,
//! - a refresh loop that polls the node over JSON-RPC at a fixed interval,
//! - graceful exit on Ctrl-C / SIGTERM.

mod shutdown;

use std::sync::Arc;

use qtum_exporter::{
    Collector, ExporterConfig, HttpConnector, MetricsRegistry, Runner, bind_metrics_listener,
    serve_metrics,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cfg = match ExporterConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("fatal error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&cfg.log_level);

    if let Err(e) = run(cfg).await {
        tracing::error!("fatal error: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise the configured level applies to every target.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Maps `LOGGING_LEVEL` values such as `WARNING` or `CRITICAL` onto
/// `tracing` level names.
fn level_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

async fn run(cfg: ExporterConfig) -> Result<(), String> {
    tracing::info!("Started Qtum (qtumd) monitor.");

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    let addr = cfg.metrics.listen_addr;
    let listener = bind_metrics_listener(addr)
        .await
        .map_err(|e| format!("failed to bind metrics listener on {addr}: {e}"))?;
    tracing::info!("metrics exporter listening on http://{addr}/metrics");

    tokio::spawn(serve_metrics(listener, metrics.clone()));

    // ---------------------------
    // Collector + refresh loop
    // ---------------------------

    let connector = HttpConnector::new(&cfg.rpc);
    tracing::info!(
        node = connector.url(),
        refresh_secs = cfg.refresh.as_secs(),
        hash_ps_windows = ?cfg.hash_ps_windows,
        smart_fee_windows = ?cfg.smart_fee_windows,
        "polling node"
    );

    let collector = Collector::from_config(connector, metrics.clone(), &cfg);
    let runner = Runner::new(collector, metrics, cfg.refresh);

    runner.run(shutdown::signal()).await;
    tracing::warn!("Exiting Qtum (qtumd) monitor.");

    Ok(())
}
