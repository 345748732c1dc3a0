//! Engine entry point: newline-delimited JSON contracts on stdin, one JSON
//! response per line on stdout.

use std::time::Duration;

use app::{Config, LogFormat, Runtime};
use tokio::io::BufReader;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries responses.
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Prometheus exporter, when an address is configured
    if let Some(addr) = config.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("failed to install Prometheus exporter");
        tracing::info!(%addr, "metrics listener started");
    }

    // 3. Engine
    let runtime = Runtime::start(&config)
        .await
        .expect("failed to start engine");
    let gateway = runtime.gateway();

    // 4. Request loop until stdin closes, an I/O error, or SIGINT
    let serve = app::lines::serve(
        &gateway,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    tokio::select! {
        result = serve => match result {
            Ok(answered) => tracing::info!(answered, "input closed"),
            Err(e) => tracing::error!(error = %e, "request loop stopped on I/O error"),
        },
        _ = signal::ctrl_c() => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
    }

    // 5. Drain in-flight projections before exiting
    if let Err(e) = runtime.settle(Duration::from_secs(5)).await {
        tracing::warn!(error = %e, "projections did not settle before shutdown");
    }
    runtime.shutdown().await;
}
