use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe our series.
    /// Later calls hand back the same handle.
    pub fn install() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

        let handle = HANDLE.get_or_try_init(|| -> anyhow::Result<PrometheusHandle> {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe_series();
            Ok(handle)
        })?;

        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_series() {
    describe_counter!("tasks_enqueued_total", "Tasks accepted by the submission endpoint.");
    describe_counter!(
        "tasks_processed_total",
        "Tasks finished by workers, labelled by outcome."
    );
    describe_counter!(
        "broadcast_pruned_total",
        "Subscribers dropped because a send failed."
    );
    describe_histogram!("task_duration_ms", "Oracle + broadcast time per task in milliseconds.");
    describe_gauge!("queue_depth", "Tasks waiting in the queue.");
    describe_gauge!("ws_subscribers", "Currently registered WebSocket subscribers.");
}
