// src/config/oracle.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const PROVIDER_OPENAI: &str = "openai";
pub const PROVIDER_MOCK: &str = "mock";
pub const PROVIDER_DISABLED: &str = "disabled";

/// Highest accepted `caption_retries`; larger values are clamped.
pub const MAX_CAPTION_RETRIES: u8 = 5;

fn default_provider() -> String {
    PROVIDER_OPENAI.to_string()
}
fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_caption_languages() -> Vec<String> {
    vec!["en".to_string(), "es".to_string()]
}
fn default_caption_retries() -> u8 {
    2
}
fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// "openai" | "mock" | "disabled" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Caption languages in order of preference.
    #[serde(default = "default_caption_languages")]
    pub caption_languages: Vec<String>,
    /// Extra attempts when YouTube serves an empty caption document.
    #[serde(default = "default_caption_retries")]
    pub caption_retries: u8,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            temperature: default_temperature(),
            caption_languages: default_caption_languages(),
            caption_retries: default_caption_retries(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OracleConfig {
    /// Normalize provider/languages, clamp temperature and resolve an "ENV" key.
    pub fn resolve(&mut self) -> anyhow::Result<()> {
        self.provider = self.provider.trim().to_lowercase();
        match self.provider.as_str() {
            PROVIDER_OPENAI | PROVIDER_MOCK | PROVIDER_DISABLED => {}
            other => anyhow::bail!("Unsupported oracle provider in config: {other}"),
        }

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match env::var("OPENAI_API_KEY") {
                Ok(key) => key,
                Err(_) if self.provider == PROVIDER_OPENAI => {
                    anyhow::bail!("Missing OPENAI_API_KEY env var")
                }
                Err(_) => String::new(),
            };
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = self.temperature.clamp(0.0, 2.0);
        }

        self.caption_languages = self
            .caption_languages
            .iter()
            .map(|l| l.trim().to_ascii_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        if self.caption_languages.is_empty() {
            self.caption_languages = default_caption_languages();
        }
        if self.caption_retries > MAX_CAPTION_RETRIES {
            tracing::warn!(
                target: "config",
                requested = self.caption_retries,
                max = MAX_CAPTION_RETRIES,
                "caption_retries too large, clamping"
            );
            self.caption_retries = MAX_CAPTION_RETRIES;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        Ok(())
    }
}
