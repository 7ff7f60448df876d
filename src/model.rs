//! # Data model
//! Tasks flowing through the queue, the oracle's evaluation result, and the
//! `videoScore` message pushed to WebSocket subscribers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Error text used when a result ends up with nothing to average.
pub const NO_CATEGORIES_ERROR: &str = "no supported categories to evaluate";

/// One queued evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub categories: Vec<String>,
    /// Opaque, only the oracle looks inside.
    #[serde(rename = "customPrompts", default, skip_serializing_if = "Option::is_none")]
    pub custom_prompts: Option<serde_json::Value>,
}

impl Task {
    pub fn new(video_id: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            video_id: video_id.into(),
            categories,
            custom_prompts: None,
        }
    }

    pub fn with_custom_prompts(mut self, prompts: serde_json::Value) -> Self {
        self.custom_prompts = Some(prompts);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connotation {
    /// Higher score = more of a desirable trait.
    Positive,
    /// Higher score = less of an undesirable trait.
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    pub score: f64,
    pub connotation: Connotation,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overall {
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
}

/// Oracle output for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(default)]
    pub categories: Vec<CategoryScore>,
    #[serde(default)]
    pub overall: Overall,
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_summary: String,
}

/// Models write `null` where they mean "nothing".
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EvaluationResult {
    /// Error-flagged result with no categories.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Default::default()
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.trim().is_empty()
    }

    /// Clamp category scores into `[0, 10]` and make `overall.score` the mean of them.
    ///
    /// An empty category list has no mean: the result is turned into an error
    /// result with `overall.score = 0` (an existing error message is kept).
    pub fn finalize(mut self) -> Self {
        for c in &mut self.categories {
            c.score = if c.score.is_finite() {
                c.score.clamp(0.0, 10.0)
            } else {
                0.0
            };
        }

        match mean_score(&self.categories) {
            Some(avg) => self.overall.score = avg,
            None => {
                self.overall.score = 0.0;
                if !self.has_error() {
                    self.error = NO_CATEGORIES_ERROR.to_string();
                }
            }
        }
        self
    }
}

/// Arithmetic mean of the category scores; `None` for an empty slice.
pub fn mean_score(categories: &[CategoryScore]) -> Option<f64> {
    if categories.is_empty() {
        return None;
    }
    let sum: f64 = categories.iter().map(|c| c.score).sum();
    Some(sum / categories.len() as f64)
}

/// Round to 2 decimals, half away from zero.
///
/// Not banker's rounding: `0.125` becomes `0.13`, not `0.12`. Binary floats such
/// as `2.675` are already slightly below the midpoint and still round down.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Wire discriminator for [`VideoScoreMessage`].
pub const VIDEO_SCORE_TYPE: &str = "videoScore";

/// What subscribers receive for one completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoScoreMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub score: f64,
    pub categories: BTreeMap<String, f64>,
    pub evaluation_summary: String,
    pub content_summary: String,
}

impl VideoScoreMessage {
    pub fn from_result(video_id: &str, result: &EvaluationResult) -> Self {
        // later duplicates overwrite earlier ones
        let categories = result
            .categories
            .iter()
            .map(|c| (c.name.clone(), round2(c.score)))
            .collect::<BTreeMap<_, _>>();

        Self {
            kind: VIDEO_SCORE_TYPE.to_string(),
            video_id: video_id.to_string(),
            score: round2(result.overall.score),
            categories,
            evaluation_summary: result.overall.reason.clone(),
            content_summary: result.content_summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cat(name: &str, score: f64) -> CategoryScore {
        CategoryScore {
            name: name.into(),
            score,
            connotation: Connotation::Positive,
            reason: String::new(),
        }
    }

    #[test]
    fn finalize_averages_and_message_rounds_to_two_decimals() {
        let res = EvaluationResult {
            categories: vec![cat("educational", 8.333), cat("clarity", 6.667)],
            overall: Overall {
                score: 1.0, // whatever the model claimed gets replaced
                reason: "solid".into(),
            },
            ..Default::default()
        }
        .finalize();

        assert!((res.overall.score - 7.5).abs() < 0.01);

        let msg = VideoScoreMessage::from_result("abc123", &res);
        assert_eq!(msg.score, 7.5);
        assert_eq!(msg.categories["educational"], 8.33);
        assert_eq!(msg.categories["clarity"], 6.67);
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(8.333), 8.33);
    }

    #[test]
    fn finalize_empty_categories_becomes_error_with_zero_score() {
        let res = EvaluationResult::default().finalize();
        assert_eq!(res.overall.score, 0.0);
        assert_eq!(res.error, NO_CATEGORIES_ERROR);

        let res = EvaluationResult::failed("boom").finalize();
        assert_eq!(res.error, "boom");
    }

    #[test]
    fn finalize_clamps_out_of_range_scores() {
        let res = EvaluationResult {
            categories: vec![cat("fraud", 14.0), cat("violence", -3.0)],
            ..Default::default()
        }
        .finalize();
        assert_eq!(res.categories[0].score, 10.0);
        assert_eq!(res.categories[1].score, 0.0);
        assert_eq!(res.overall.score, 5.0);
    }

    #[test]
    fn duplicate_category_names_keep_last_score() {
        let res = EvaluationResult {
            categories: vec![cat("clarity", 2.0), cat("clarity", 9.0)],
            ..Default::default()
        }
        .finalize();
        let msg = VideoScoreMessage::from_result("v", &res);
        assert_eq!(msg.categories.len(), 1);
        assert_eq!(msg.categories["clarity"], 9.0);
    }

    #[test]
    fn message_serializes_with_wire_field_names() {
        let res = EvaluationResult {
            categories: vec![cat("hatred", 9.0)],
            overall: Overall {
                score: 0.0,
                reason: "calm".into(),
            },
            content_summary: "cooking".into(),
            ..Default::default()
        }
        .finalize();
        let v = serde_json::to_value(VideoScoreMessage::from_result("abc123", &res)).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "videoScore",
                "videoId": "abc123",
                "score": 9.0,
                "categories": { "hatred": 9.0 },
                "evaluation_summary": "calm",
                "content_summary": "cooking"
            })
        );
    }

    #[test]
    fn null_fields_deserialize_as_defaults() {
        let res: EvaluationResult = serde_json::from_value(json!({
            "categories": [],
            "overall": { "score": null, "reason": null },
            "error": null,
            "content_summary": null
        }))
        .unwrap();
        assert_eq!(res.overall, Overall::default());
        assert_eq!(res.error, "");
    }

    #[test]
    fn task_accepts_missing_custom_prompts() {
        let t: Task =
            serde_json::from_value(json!({ "videoId": "x", "categories": ["clarity"] })).unwrap();
        assert_eq!(t.custom_prompts, None);
        assert_eq!(t.categories, vec!["clarity".to_string()]);
    }
}
