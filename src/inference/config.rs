//! Gateway configuration loading and validation.
//!
//! Reads `finchat.yaml` and resolves environment variables. Recognized keys
//! use snake_case; the camelCase spellings (`apiKey`, `baseUrl`, …) are
//! accepted as aliases.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use super::errors::InferenceError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "finchat.yaml";

/// Env var pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FINCHAT_CONFIG";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which wire-format adapter the gateway uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Provider {
    /// OpenAI Chat Completions (and compatible servers).
    #[default]
    #[serde(rename = "openai", alias = "open_ai", alias = "openai_compatible")]
    OpenAi,
}

/// Model gateway and orchestration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub provider: Provider,
    #[serde(alias = "apiKey", deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    pub model: String,
    #[serde(alias = "maxTokens")]
    pub max_tokens: u32,
    pub temperature: f32,
    /// Short-circuit every consultation to a canned reply (no network).
    #[serde(alias = "developmentMockMode")]
    pub development_mock_mode: bool,
    /// Diagnostic only: log outgoing request bodies.
    #[serde(alias = "logRequests")]
    pub log_requests: bool,
    /// Diagnostic only: log raw reply bodies.
    #[serde(alias = "logResponses")]
    pub log_responses: bool,
    /// Cap on consecutive tool round-trips within one exchange.
    #[serde(alias = "maxToolRounds")]
    pub max_tool_rounds: usize,
    #[serde(alias = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,
    /// Replaces the built-in system instruction when set.
    #[serde(alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    /// SQLite file for the event log; in-memory when absent.
    #[serde(alias = "eventLogPath")]
    pub event_log_path: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            max_tokens: 1024,
            temperature: 0.2,
            development_mock_mode: false,
            log_requests: false,
            log_responses: false,
            max_tool_rounds: 5,
            request_timeout_secs: 30,
            system_prompt: None,
            event_log_path: None,
        }
    }
}

impl GatewayConfig {
    /// Check invariants the gateway relies on.
    ///
    /// A missing credential is reported as `MissingCredential` so callers can
    /// show setup guidance.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if !self.development_mock_mode && !self.has_api_key() {
            return Err(InferenceError::MissingCredential);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(config_error(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(config_error("max_tokens must be greater than zero"));
        }
        if self.max_tool_rounds == 0 {
            return Err(config_error("max_tool_rounds must be at least 1"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(config_error(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Whether a non-blank API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }

    /// Apply environment overrides on top of file values.
    ///
    /// `FINCHAT_API_KEY` wins over `OPENAI_API_KEY`; both win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_blank("FINCHAT_API_KEY").or_else(|| non_blank("OPENAI_API_KEY")) {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(model) = non_blank("FINCHAT_MODEL") {
            self.model = model;
        }
        if let Some(url) = non_blank("FINCHAT_BASE_URL") {
            self.base_url = url;
        }
        if let Some(flag) = non_blank("FINCHAT_MOCK_MODE") {
            self.development_mock_mode = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    /// Base URL without a trailing slash.
    pub fn endpoint_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Blank keys deserialize to `None` (an unset `${VAR}` interpolates to "").
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

fn config_error(reason: impl Into<String>) -> InferenceError {
    InferenceError::ConfigError {
        reason: reason.into(),
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `FINCHAT_CONFIG` first, then searches upward from `start` for
/// `finchat.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(&path);
        if candidate.exists() {
            return Ok(candidate);
        }
        tracing::warn!(path = %path, "FINCHAT_CONFIG points at a missing file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(config_error(format!("could not find {CONFIG_FILE_NAME}")))
}

/// Load and parse a config file.
///
/// Performs environment-variable interpolation on the raw text for
/// `${VAR_NAME}` and `${VAR_NAME:-default}`. Env overrides are NOT applied
/// here; call [`GatewayConfig::apply_env_overrides`] afterwards.
pub fn load_config(path: &Path) -> Result<GatewayConfig, InferenceError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| config_error(format!("failed to read {}: {e}", path.display())))?;
    parse_config(&raw)
}

/// Parse config text (after interpolation). An empty document yields defaults.
pub fn parse_config(raw: &str) -> Result<GatewayConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(GatewayConfig::default());
    }
    serde_yaml::from_str(&interpolated)
        .map_err(|e| config_error(format!("failed to parse config: {e}")))
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
