// src/oracle/prompt.rs
//! Prompt text and the category catalogue the model is allowed to score.

use serde_json::Value;

use crate::model::{Connotation, Task};

/// Categories the model is trained to detect, with their connotation.
pub const SUPPORTED_CATEGORIES: [(&str, Connotation); 8] = [
    ("hatred", Connotation::Negative),
    ("misinformation", Connotation::Negative),
    ("violence", Connotation::Negative),
    ("fraud", Connotation::Negative),
    ("educational", Connotation::Positive),
    ("relevance", Connotation::Positive),
    ("integrity", Connotation::Positive),
    ("clarity", Connotation::Positive),
];

/// Connotation of a supported category (English name, case-insensitive).
pub fn connotation_of(name: &str) -> Option<Connotation> {
    let name = name.trim();
    SUPPORTED_CATEGORIES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, c)| *c)
}

const WATCH_URL: &str = "https://www.youtube.com/watch";

/// Watch URL for a video, with the id query-encoded.
pub fn video_url(video_id: &str) -> String {
    match reqwest::Url::parse_with_params(WATCH_URL, &[("v", video_id)]) {
        Ok(url) => url.into(),
        Err(_) => format!("{WATCH_URL}?v={video_id}"),
    }
}

const ROLE: &str = "\
You are a content integrity and quality analyst who evaluates YouTube video captions. \
You are an expert in content policy enforcement, linguistic analysis and media integrity. \
You detect harmful content (hate speech, misinformation, fraud) and judge the clarity, \
educational value and relevance of the language, using only textual evidence.";

const GOAL: &str = "\
Assess whether specific content categories are present, based solely on the language of \
the transcript. Be precise and unbiased; make no assumptions about tone or intent.";

const INSTRUCTIONS: &str = r#"You receive a list of categories, a YouTube video URL and the video transcript.

First, validate and filter the input categories:
- You only detect: ["hatred", "misinformation", "violence", "fraud", "educational", "relevance", "integrity", "clarity"].
  Categories may be given in any language; translate them to English to match.
- Discard every other category. Never mention or score unsupported categories.
- If no valid category remains, respond with a JSON object whose "error" field explains it and stop.

Category definitions:
- Hatred: hostile or dehumanizing language toward an identity group (slurs, broad generalizations, exclusionary or mocking terms).
- Misinformation: false or misleading claims presented as fact (conspiracy theories, medical disinformation, unsubstantiated claims).
- Violence: promotion, glorification or instruction of physical harm (threats, calls to action, detailed violent scenarios).
- Fraud: deceptive offers or scams involving money, crypto or personal data (too-good-to-be-true promises, giveaway scams, fake endorsements).
- Educational: explanatory or instructional content (definitions, structured explanations, walkthroughs).
- Relevance: alignment with the stated topic (on-topic progression, no bait-and-switch).
- Integrity: honest communication without manipulation, clickbait or false urgency (disclaimers, reasonable claims).
- Clarity: clear, structured, understandable language with logical flow.

Scoring, 0 to 10 for each valid category:
- Positive connotation ("educational", "relevance", "integrity", "clarity"): 10 = strong presence, 0 = absent.
- Negative connotation ("hatred", "misinformation", "violence", "fraud"): 0 = strong presence, 10 = absent.
Give the connotation ("positive" or "negative") and a concise reason that references the transcript.

Then compute the overall average score with a short summary of the reasons, and summarize the video
content in at most 3 neutral sentences.

Respond with exactly one JSON object:
{
  "categories": [
    {"name": "category name in the input language", "score": 0, "connotation": "positive", "reason": "..."}
  ],
  "overall": {"score": 0, "reason": "..."},
  "error": "",
  "content_summary": "..."
}
Start the response with `{` and end it with `}`. Output valid JSON only."#;

/// System message: role, goal and instructions.
pub fn system_prompt() -> String {
    format!("{ROLE}\n\n{GOAL}\n\n{INSTRUCTIONS}")
}

/// User message for one task.
///
/// `customPrompts` is honoured only when it is an array; each entry is appended
/// as an additional user prompt. Anything else is ignored.
pub fn user_prompt(task: &Task, transcript: &str) -> String {
    let mut prompt = format!(
        "Categories:{:?}. URL:{}.",
        task.categories,
        video_url(&task.video_id)
    );

    match &task.custom_prompts {
        Some(Value::Array(items)) => {
            for item in items {
                let text = match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prompt.push_str(&format!(" Additional user prompt: {text}."));
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            tracing::warn!(
                target: "oracle",
                video_id = %task.video_id,
                custom_prompts = %other,
                "customPrompts is not an array; ignoring it"
            );
        }
    }

    prompt.push_str("\n\nTranscript:\n");
    prompt.push_str(transcript);
    prompt
}
