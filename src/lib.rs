// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod oracle;
pub mod queue;
pub mod telemetry;
pub mod worker;
pub mod ws;

use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::oracle::{build_oracle, DynOracle};
pub use crate::worker::{ShutdownReport, WorkerPool};

/// A wired-up service: router plus the worker pool draining its queue.
pub struct App {
    pub router: Router,
    pub state: AppState,
    pub workers: WorkerPool,
}

/// Create the queue, hub and worker pool, and build the router around them.
///
/// Must be called inside a tokio runtime (workers are spawned immediately).
pub fn build_app(config: AppConfig, oracle: DynOracle) -> anyhow::Result<App> {
    let mut state = AppState::new(config);
    if state.config.metrics.enabled {
        state.metrics = Some(crate::metrics::Metrics::install()?);
    }

    let workers = WorkerPool::spawn(
        state.config.workers,
        state.queue.clone(),
        state.hub.clone(),
        oracle,
    );
    let router = api::router(state.clone());

    Ok(App {
        router,
        state,
        workers,
    })
}

/// Serve HTTP until `shutdown` resolves, then stop the workers within the grace period.
pub async fn serve<F>(app: App, listener: TcpListener, shutdown: F) -> anyhow::Result<ShutdownReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let App {
        router,
        state,
        workers,
    } = app;

    if let Ok(addr) = listener.local_addr() {
        info!(
            "Starting {} at http://{addr} (ws: {})",
            state.config.app_name, state.config.ws_endpoint
        );
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!(
        pending = state.queue.len(),
        "HTTP server stopped; cancelling workers"
    );
    Ok(workers.shutdown(state.config.shutdown_grace()).await)
}
