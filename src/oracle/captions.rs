// src/oracle/captions.rs
//! YouTube transcript retrieval.
//!
//! The watch page embeds a `captionTracks` JSON array; each track points at a
//! timedtext XML document (`<transcript><text start=".." dur="..">..</text>..`).

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::config::oracle::MAX_CAPTION_RETRIES;
use crate::error::CaptionError;

/// Anything that can produce a plain-text transcript for a video.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn transcript(&self, video_id: &str, languages: &[String]) -> Result<String, CaptionError>;
}

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Fetch a transcript, retrying transient failures up to `retries` extra times.
///
/// `retries` is capped at [`MAX_CAPTION_RETRIES`]; the delay doubles per attempt
/// and never exceeds [`MAX_BACKOFF`].
pub async fn fetch_with_retry(
    source: &dyn CaptionSource,
    video_id: &str,
    languages: &[String],
    retries: u8,
    base_delay: Duration,
) -> Result<String, CaptionError> {
    let retries = u32::from(retries.min(MAX_CAPTION_RETRIES));
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match source.transcript(video_id, languages).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt <= retries => {
                tracing::warn!(
                    target: "captions",
                    %video_id, attempt, error = %e,
                    "transient caption error, retrying"
                );
                tokio::time::sleep(backoff(base_delay, attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// `Some("asr")` for auto-generated tracks.
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

const WATCH_URL: &str = "https://www.youtube.com/watch";

/// Transcript source backed by the public YouTube web endpoints.
pub struct YouTubeCaptions {
    http: reqwest::Client,
}

impl YouTubeCaptions {
    pub fn new(timeout: Duration) -> Result<Self, CaptionError> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; caption-evaluator/0.1)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Watch page request; the id is query-encoded, never spliced into the URL.
    fn watch_request(&self, video_id: &str) -> reqwest::RequestBuilder {
        self.http.get(WATCH_URL).query(&[("v", video_id)])
    }

    async fn get_text(&self, request: reqwest::RequestBuilder) -> Result<String, CaptionError> {
        let resp = request
            .header("Accept-Language", "en-US,en;q=0.8")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CaptionError::Status(resp.status().as_u16()));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl CaptionSource for YouTubeCaptions {
    async fn transcript(&self, video_id: &str, languages: &[String]) -> Result<String, CaptionError> {
        let page = self
            .get_text(self.watch_request(video_id))
            .await?;
        let tracks = caption_tracks(&page);
        let track = pick_track(&tracks, languages)
            .ok_or_else(|| CaptionError::NoTracks(languages.to_vec()))?;
        tracing::debug!(
            target: "captions",
            %video_id,
            language = %track.language_code,
            generated = track.is_generated(),
            "caption track selected"
        );
        let xml = self.get_text(self.http.get(&track.base_url)).await?;
        parse_timedtext(&xml)
    }
}

/// Extract the `captionTracks` array from a watch page. Empty when absent or malformed.
pub fn caption_tracks(page: &str) -> Vec<CaptionTrack> {
    const KEY: &str = "\"captionTracks\":";
    let Some(start) = page.find(KEY).map(|i| i + KEY.len()) else {
        return Vec::new();
    };
    let Some(raw) = balanced_array(&page[start..]) else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_default()
}

/// Slice the JSON array at the start of `s`, honouring nested brackets and strings.
fn balanced_array(s: &str) -> Option<&str> {
    let s = s.trim_start();
    if !s.starts_with('[') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Preferred language first; within a language a manual track beats an auto-generated one.
pub fn pick_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    languages.iter().find_map(|lang| {
        let all: Vec<&CaptionTrack> = tracks
            .iter()
            .filter(|t| {
                t.language_code.eq_ignore_ascii_case(lang)
                    || t.language_code
                        .split('-')
                        .next()
                        .is_some_and(|base| base.eq_ignore_ascii_case(lang))
            })
            .collect();
        all.iter()
            .find(|t| !t.is_generated())
            .or_else(|| all.first())
            .copied()
    })
}

/// Flatten a timedtext document into one line of text.
pub fn parse_timedtext(xml: &str) -> Result<String, CaptionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_element = false;
    let mut lines: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) => saw_element = true,
            Ok(Event::Text(t)) => {
                let raw = t
                    .unescape()
                    .map_err(|e| CaptionError::Xml(e.to_string()))?;
                // timedtext escapes twice (`&amp;#39;`), the second layer is HTML
                let line = html_escape::decode_html_entities(&raw);
                let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
                if !line.is_empty() {
                    lines.push(line);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CaptionError::Xml(e.to_string())),
        }
    }

    if !saw_element {
        return Err(CaptionError::EmptyDocument);
    }
    Ok(lines.join(" "))
}
