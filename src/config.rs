use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{WebClawError, WebClawResult};

/// Immutable agent configuration, passed into task creation.
/// Never process-wide mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum number of perceive→act cycles before forced termination.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Per-call timeout for the two I/O boundary calls (oracle / dispatch).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default)]
    pub viewport: Viewport,

    #[serde(default)]
    pub headless: bool,

    /// How many recent steps are rendered into the oracle prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Scan attempts per PERCEIVE before the task fails.
    #[serde(default = "default_scan_retries")]
    pub scan_retries: u32,

    /// Linear backoff between scan attempts.
    #[serde(default = "default_scan_backoff_ms")]
    pub scan_backoff_ms: u64,

    /// Consecutive failed steps tolerated before aborting the task.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Default pixel distance for scroll actions without an explicit amount.
    #[serde(default = "default_scroll_amount")]
    pub scroll_amount: u32,

    #[serde(default)]
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub api_base: String,

    /// Decision-model identifier sent to the API.
    pub model: String,

    /// API key stored in config.toml (falls back to env var WEBCLAW_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o".into(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl OracleConfig {
    /// Config-file key wins, env var is the fallback.
    pub fn resolve_api_key(&self) -> WebClawResult<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var("WEBCLAW_API_KEY").map_err(|_| {
            WebClawError::Config(
                "no oracle API key: set oracle.api_key in config.toml or WEBCLAW_API_KEY".into(),
            )
        })
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            call_timeout_ms: default_call_timeout_ms(),
            viewport: Viewport::default(),
            headless: false,
            history_limit: default_history_limit(),
            scan_retries: default_scan_retries(),
            scan_backoff_ms: default_scan_backoff_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            scroll_amount: default_scroll_amount(),
            oracle: OracleConfig::default(),
        }
    }
}

fn default_max_steps() -> u32 {
    50
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_history_limit() -> usize {
    10
}

fn default_scan_retries() -> u32 {
    3
}

fn default_scan_backoff_ms() -> u64 {
    500
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_scroll_amount() -> u32 {
    500
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

fn resolve_config_path() -> WebClawResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(WebClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> WebClawResult<AgentConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AgentConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        model = %config.oracle.model,
        max_steps = config.max_steps,
        "config loaded"
    );
    Ok(config)
}
