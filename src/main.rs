//! Caption evaluator binary entrypoint.
//! Loads config, starts the worker pool and serves HTTP + WebSocket until a
//! shutdown signal arrives.

use anyhow::Context;
use caption_evaluator::{build_app, build_oracle, serve, telemetry, AppConfig};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().context("loading configuration")?;
    telemetry::init_tracing(config.debug);

    let oracle = build_oracle(&config.oracle).context("building oracle")?;
    let addr = config.bind_addr();
    let app = build_app(config, oracle)?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let report = serve(app, listener, shutdown_signal()).await?;
    info!(
        stopped = report.stopped,
        aborted = report.aborted,
        "shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
