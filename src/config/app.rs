// src/config/app.rs
//! Process-wide settings, loaded once at startup and shared read-only.
//!
//! Sources, lowest to highest precedence:
//! 1. built-in defaults
//! 2. TOML file (`$APP_CONFIG_PATH`, else `config/app.toml` when present)
//! 3. environment overrides (`HOST`, `PORT`, `WORKERS`, ...)

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::oracle::{OracleConfig, PROVIDER_MOCK};

pub const DEFAULT_APP_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_APP_CONFIG_PATH: &str = "APP_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose `/metrics` (Prometheus exposition format).
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_name: String,
    pub debug: bool,
    pub host: String,
    pub port: u16,
    /// Number of concurrent queue workers.
    pub workers: usize,
    /// Path of the WebSocket subscription endpoint.
    pub ws_endpoint: String,
    /// How long shutdown waits for workers before aborting them.
    pub shutdown_grace_secs: u64,
    /// Per-subscriber deadline for one outbound frame; slower peers are dropped.
    pub ws_send_timeout_ms: u64,
    pub metrics: MetricsConfig,
    pub oracle: OracleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "YouTube Caption Evaluator".to_string(),
            debug: false,
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: 8,
            ws_endpoint: "/ws".to_string(),
            shutdown_grace_secs: 10,
            ws_send_timeout_ms: 5000,
            metrics: MetricsConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Full startup load: file (if any) + env overrides + validation.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_APP_CONFIG_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                if !path.exists() {
                    return Err(anyhow!(
                        "{ENV_APP_CONFIG_PATH} points to non-existent path {}",
                        path.display()
                    ));
                }
                Self::read_file(&path)?
            }
            Err(_) => {
                let path = PathBuf::from(DEFAULT_APP_CONFIG_PATH);
                if path.exists() {
                    Self::read_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.finish()
    }

    /// Load a specific file without looking at env overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_file(path.as_ref())?.finish()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing app config TOML")?;
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading app config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                self.host = host.trim().to_string();
            }
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            self.port = port;
        }
        if let Some(workers) = env_parse::<usize>("WORKERS")? {
            self.workers = workers;
        }
        if let Ok(path) = std::env::var("WS_ENDPOINT") {
            self.ws_endpoint = path.trim().to_string();
        }
        if let Some(grace) = env_parse::<u64>("SHUTDOWN_GRACE_SECS")? {
            self.shutdown_grace_secs = grace;
        }
        if let Some(ms) = env_parse::<u64>("WS_SEND_TIMEOUT_MS")? {
            self.ws_send_timeout_ms = ms;
        }
        if let Ok(v) = std::env::var("METRICS_ENABLED") {
            self.metrics.enabled = matches!(v.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.oracle.model = model.trim().to_string();
            }
        }
        if std::env::var("AI_TEST_MODE").is_ok_and(|v| v == "mock") {
            self.oracle.provider = PROVIDER_MOCK.to_string();
        }
        Ok(())
    }

    /// Validate and normalize. Consumes `self` so a config is only used once checked.
    pub fn finish(mut self) -> Result<Self> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if !self.ws_endpoint.starts_with('/') {
            anyhow::bail!("ws_endpoint must start with '/', got {:?}", self.ws_endpoint);
        }
        if self.ws_send_timeout_ms == 0 {
            anyhow::bail!("ws_send_timeout_ms must be greater than zero");
        }
        self.oracle.resolve()?;
        Ok(self)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn ws_send_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_send_timeout_ms)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid {name}={raw:?}: {e}")),
        _ => Ok(None),
    }
}
