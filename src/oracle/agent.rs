// src/oracle/agent.rs
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::captions::{fetch_with_retry, CaptionSource};
use super::openai::ChatModel;
use super::parse::parse_model_response;
use super::prompt::{system_prompt, user_prompt};
use super::Oracle;
use crate::error::OracleError;
use crate::model::{EvaluationResult, Task};

/// Transcript + chat model evaluator.
///
/// Caption failures come back as error results; only model transport failures
/// are returned as `Err`.
pub struct AgentOracle<C, M> {
    captions: C,
    model: M,
    languages: Vec<String>,
    caption_retries: u8,
    retry_delay: Duration,
}

impl<C: CaptionSource, M: ChatModel> AgentOracle<C, M> {
    pub fn new(captions: C, model: M, languages: Vec<String>, caption_retries: u8) -> Self {
        Self {
            captions,
            model,
            languages,
            caption_retries,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[async_trait]
impl<C: CaptionSource, M: ChatModel> Oracle for AgentOracle<C, M> {
    async fn evaluate(&self, task: &Task) -> Result<EvaluationResult, OracleError> {
        info!(target: "oracle", video_id = %task.video_id, model = self.model.name(), "starting evaluation");

        let transcript = match fetch_with_retry(
            &self.captions,
            &task.video_id,
            &self.languages,
            self.caption_retries,
            self.retry_delay,
        )
        .await
        {
            Ok(t) if !t.trim().is_empty() => t,
            Ok(_) => return Ok(EvaluationResult::failed("captions unavailable: transcript is empty")),
            Err(e) => {
                warn!(target: "oracle", video_id = %task.video_id, error = %e, "captions unavailable");
                return Ok(EvaluationResult::failed(format!("captions unavailable: {e}")));
            }
        };

        let user = user_prompt(task, &transcript);
        let raw = self.model.complete(&system_prompt(), &user).await?;
        Ok(parse_model_response(&raw))
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}
