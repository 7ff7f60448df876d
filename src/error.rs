// src/error.rs
//! Typed errors for the oracle, the queue and the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::StatusResponse;

/// Failures while retrieving a transcript.
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("caption request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("caption request returned HTTP {0}")]
    Status(u16),
    #[error("no caption track available for languages {0:?}")]
    NoTracks(Vec<String>),
    /// YouTube sometimes serves an empty timedtext body; retrying usually helps.
    #[error("caption document is empty (no element found)")]
    EmptyDocument,
    #[error("caption document is not valid XML: {0}")]
    Xml(String),
}

impl CaptionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptionError::EmptyDocument)
    }
}

/// Failures raised by an oracle. These abandon the task (nothing is broadcast).
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("missing API key for provider {0}")]
    MissingApiKey(&'static str),
    #[error("model returned an empty completion")]
    EmptyCompletion,
    #[error("unknown oracle provider {0:?}")]
    UnknownProvider(String),
    #[error(transparent)]
    Captions(#[from] CaptionError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("mark_done called more times than tasks were enqueued")]
    TooManyDone,
}

/// Submission rejections, rendered as `422 {"status":"rejected","detail":...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidBody(String),
    #[error("videoId must not be empty")]
    EmptyVideoId,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = StatusResponse {
            status: "rejected".to_string(),
            detail: Some(self.to_string()),
        };
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}
