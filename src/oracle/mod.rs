// src/oracle/mod.rs
//! Scoring oracle: provider abstraction + concrete evaluators.
//!
//! Workers only see [`Oracle`]. Which implementation backs it is decided once at
//! startup by [`build_oracle`] from the `[oracle]` config section.

pub mod agent;
pub mod captions;
pub mod openai;
pub mod parse;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::oracle::{OracleConfig, PROVIDER_DISABLED, PROVIDER_MOCK, PROVIDER_OPENAI};
use crate::error::OracleError;
use crate::model::{CategoryScore, EvaluationResult, Overall, Task};

pub use agent::AgentOracle;
pub use captions::{CaptionSource, YouTubeCaptions};
pub use openai::{ChatModel, OpenAiChat};

/// Turns a task into an evaluation.
///
/// Recoverable problems (no captions, unparseable model output) should come back
/// as `Ok` with `error` set; `Err` is for failures that abandon the task.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn evaluate(&self, task: &Task) -> Result<EvaluationResult, OracleError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn Oracle>;

/// Factory: build the oracle named by `config.provider`.
pub fn build_oracle(config: &OracleConfig) -> Result<DynOracle, OracleError> {
    match config.provider.as_str() {
        PROVIDER_MOCK => Ok(Arc::new(MockOracle)),
        PROVIDER_DISABLED => Ok(Arc::new(DisabledOracle)),
        PROVIDER_OPENAI => {
            let timeout = Duration::from_secs(config.request_timeout_secs);
            let captions = YouTubeCaptions::new(timeout)?;
            let chat = OpenAiChat::new(
                config.api_key.clone(),
                config.model.clone(),
                config.temperature,
                timeout,
            )?;
            Ok(Arc::new(AgentOracle::new(
                captions,
                chat,
                config.caption_languages.clone(),
                config.caption_retries,
            )))
        }
        other => Err(OracleError::UnknownProvider(other.to_string())),
    }
}

/// Deterministic oracle for local runs and tests: scores every supported
/// requested category, drops the rest.
pub struct MockOracle;

impl MockOracle {
    fn score_for(name: &str) -> f64 {
        // stable, name-dependent score in [5, 10)
        let sum: u32 = name.bytes().map(u32::from).sum();
        5.0 + f64::from(sum % 50) / 10.0
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn evaluate(&self, task: &Task) -> Result<EvaluationResult, OracleError> {
        let categories = task
            .categories
            .iter()
            .filter_map(|name| {
                let connotation = prompt::connotation_of(name)?;
                Some(CategoryScore {
                    name: name.clone(),
                    score: Self::score_for(&name.to_ascii_lowercase()),
                    connotation,
                    reason: "mock evaluation".to_string(),
                })
            })
            .collect();

        Ok(EvaluationResult {
            categories,
            overall: Overall {
                score: 0.0,
                reason: "Mock evaluation summary".to_string(),
            },
            error: String::new(),
            content_summary: format!("Mock summary for video {}", task.video_id),
        }
        .finalize())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Always answers with an error result; used when evaluation is switched off.
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    async fn evaluate(&self, _task: &Task) -> Result<EvaluationResult, OracleError> {
        Ok(EvaluationResult::failed("evaluation disabled"))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
