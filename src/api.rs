use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::hub::BroadcastHub;
use crate::metrics::Metrics;
use crate::model::Task;
use crate::queue::TaskQueue;
use crate::ws;

pub const SUBMIT_PATH: &str = "/api/videos/evaluate";

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<TaskQueue>,
    pub hub: Arc<BroadcastHub>,
    pub config: Arc<AppConfig>,
    pub metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            hub: Arc::new(BroadcastHub::with_send_timeout(config.ws_send_timeout())),
            config: Arc::new(config),
            metrics: None,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let ws_path = state.config.ws_endpoint.clone();

    let mut app = Router::new()
        .route("/ping", get(ping))
        .route("/health", get(|| async { "ok" }))
        .route(SUBMIT_PATH, post(submit))
        .route(&ws_path, get(ws::subscribe))
        .with_state(state);

    if let Some(m) = metrics {
        app = app.merge(m.router());
    }

    app.layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize)]
struct PingResp {
    message: &'static str,
}

async fn ping() -> Json<PingResp> {
    Json(PingResp { message: "pong" })
}

async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<Task>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let Json(mut task) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    task.video_id = task.video_id.trim().to_string();
    if task.video_id.is_empty() {
        return Err(ApiError::EmptyVideoId);
    }

    let video_id = task.video_id.clone();
    state.queue.enqueue(task);
    counter!("tasks_enqueued_total").increment(1);
    info!(target: "api", %video_id, queued = state.queue.len(), "enqueued video");

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "submitted".to_string(),
            detail: Some(format!("Video {video_id} successfully enqueued.")),
        }),
    ))
}
