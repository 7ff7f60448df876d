// src/oracle/parse.rs
//! Turn raw model output into an [`EvaluationResult`].
//!
//! Models sometimes wrap the JSON in prose or code fences, so the outermost
//! `{ ... }` span is extracted first. Anything that still fails to decode
//! becomes an error result instead of an `Err`.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::model::EvaluationResult;

fn json_span() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("json span regex"))
}

pub fn parse_model_response(response: &str) -> EvaluationResult {
    let Some(m) = json_span().find(response) else {
        tracing::error!(target: "oracle", "model response contains no JSON object");
        return EvaluationResult::failed("model response contains no JSON object");
    };

    match serde_json::from_str::<EvaluationResult>(m.as_str()) {
        Ok(parsed) => parsed.finalize(),
        Err(e) => {
            tracing::error!(target: "oracle", error = %e, "error parsing model response");
            EvaluationResult::failed(format!("unparseable model response: {e}"))
        }
    }
}
