use std::collections::HashMap;
use std::env;
use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::endpoints::ENDPOINT_NAMES;
use crate::llm::LlmSettings;

const DEFAULT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Optional JSON file named by `ASSIST_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssistFileConfig {
    /// Per-endpoint request budget per window, keyed by route name.
    #[serde(default)]
    pub endpoint_limits: HashMap<String, u32>,
    /// Literal phrases screened in addition to the built-in pattern table.
    #[serde(default)]
    pub injection_phrases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` when the model credentials are absent; endpoints then answer 503.
    pub llm: Option<LlmSettings>,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_entries: usize,
    pub rate_limit_sweep_secs: u64,
    pub max_request_bytes: usize,
    pub endpoint_limits: HashMap<String, u32>,
    pub injection_phrases: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            llm: None,
            rate_limit_window_ms: 60_000,
            rate_limit_max_entries: 10_000,
            rate_limit_sweep_secs: 60,
            max_request_bytes: 64 * 1024,
            endpoint_limits: HashMap::new(),
            injection_phrases: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let file = if let Ok(path) = env::var("ASSIST_CONFIG") {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read ASSIST_CONFIG '{}': file unreadable", path))?;
            let parsed = serde_json::from_str::<AssistFileConfig>(&content).with_context(|| {
                format!("Failed to parse ASSIST_CONFIG '{}': invalid JSON configuration", path)
            })?;
            for (name, max) in &parsed.endpoint_limits {
                if !ENDPOINT_NAMES.contains(&name.as_str()) {
                    bail!("ASSIST_CONFIG endpointLimits names unknown endpoint '{}'", name);
                }
                if *max == 0 {
                    bail!("ASSIST_CONFIG endpointLimits.{} must be at least 1", name);
                }
            }
            parsed
        } else {
            AssistFileConfig::default()
        };

        let defaults = Self::default();
        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| anyhow!("PORT must be a valid TCP port"))?,
            None => defaults.port,
        };

        let api_url = non_empty_var("LLM_API_URL");
        let api_token = non_empty_var("LLM_API_TOKEN");
        let llm = match (api_url, api_token) {
            (Some(api_url), Some(api_token)) => Some(LlmSettings {
                api_url,
                api_token,
                model: non_empty_var("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout_ms: positive("LLM_TIMEOUT_MS", 25_000)?,
            }),
            (None, None) => None,
            (url, _) => {
                tracing::warn!(
                    missing = if url.is_none() { "LLM_API_URL" } else { "LLM_API_TOKEN" },
                    "model credentials incomplete; assist endpoints will answer 503"
                );
                None
            }
        };

        let rate_limit_window_ms = positive("RATE_LIMIT_WINDOW_MS", defaults.rate_limit_window_ms)?;
        let rate_limit_max_entries =
            positive("RATE_LIMIT_MAX_ENTRIES", defaults.rate_limit_max_entries as u64)? as usize;
        let rate_limit_sweep_secs = positive("RATE_LIMIT_SWEEP_SECS", defaults.rate_limit_sweep_secs)?;
        let max_request_bytes =
            positive("ASSIST_MAX_REQUEST_BYTES", defaults.max_request_bytes as u64)? as usize;

        Ok(Self {
            port,
            llm,
            rate_limit_window_ms,
            rate_limit_max_entries,
            rate_limit_sweep_secs,
            max_request_bytes,
            endpoint_limits: file.endpoint_limits,
            injection_phrases: file
                .injection_phrases
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive(var: &str, default: u64) -> Result<u64> {
    match parse_optional_u64(var)? {
        Some(0) => Err(anyhow!("{} must be greater than zero", var)),
        Some(v) => Ok(v),
        None => Ok(default),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const VARS: &[&str] = &[
        "ASSIST_CONFIG",
        "PORT",
        "LLM_API_URL",
        "LLM_API_TOKEN",
        "LLM_MODEL",
        "LLM_TIMEOUT_MS",
        "RATE_LIMIT_WINDOW_MS",
        "RATE_LIMIT_MAX_ENTRIES",
        "RATE_LIMIT_SWEEP_SECS",
        "ASSIST_MAX_REQUEST_BYTES",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn parses_environment_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();

        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(cfg.llm.is_none());
        assert_eq!(cfg.rate_limit_window_ms, 60_000);
        assert_eq!(cfg.rate_limit_max_entries, 10_000);
        assert_eq!(cfg.rate_limit_sweep_secs, 60);
        assert_eq!(cfg.max_request_bytes, 65_536);
        assert!(cfg.endpoint_limits.is_empty());
    }

    #[test]
    fn parses_full_configuration() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();

        let mut temp = NamedTempFile::new().unwrap();
        let config = serde_json::json!({
            "endpointLimits": {"polish-text": 5},
            "injectionPhrases": ["  secret handshake ", ""]
        });
        write!(temp, "{}", config).unwrap();

        std::env::set_var("ASSIST_CONFIG", temp.path());
        std::env::set_var("PORT", "9090");
        std::env::set_var("LLM_API_URL", "https://api.example.com/ai/run/");
        std::env::set_var("LLM_API_TOKEN", "tok");
        std::env::set_var("LLM_TIMEOUT_MS", "1500");
        std::env::set_var("RATE_LIMIT_WINDOW_MS", "1000");
        std::env::set_var("RATE_LIMIT_MAX_ENTRIES", "50");
        std::env::set_var("ASSIST_MAX_REQUEST_BYTES", "2048");

        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.port, 9090);
        let llm = cfg.llm.unwrap();
        assert_eq!(llm.model, DEFAULT_MODEL);
        assert_eq!(llm.timeout_ms, 1500);
        assert_eq!(cfg.rate_limit_window_ms, 1000);
        assert_eq!(cfg.rate_limit_max_entries, 50);
        assert_eq!(cfg.max_request_bytes, 2048);
        assert_eq!(cfg.endpoint_limits.get("polish-text"), Some(&5));
        assert_eq!(cfg.injection_phrases, vec!["secret handshake".to_string()]);

        clear();
    }

    #[test]
    fn half_configured_model_is_treated_as_absent() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();
        std::env::set_var("LLM_API_URL", "https://api.example.com");
        assert!(AppConfig::from_env().unwrap().llm.is_none());
        clear();
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();
        std::env::set_var("RATE_LIMIT_WINDOW_MS", "soon");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_WINDOW_MS"));

        std::env::set_var("RATE_LIMIT_WINDOW_MS", "0");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
        clear();
    }

    #[test]
    fn zero_model_timeout_is_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();
        std::env::set_var("LLM_API_URL", "https://api.example.com");
        std::env::set_var("LLM_API_TOKEN", "tok");
        std::env::set_var("LLM_TIMEOUT_MS", "0");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("LLM_TIMEOUT_MS must be greater than zero"));
        clear();
    }

    #[test]
    fn unknown_endpoint_in_file_is_rejected() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear();
        let mut temp = NamedTempFile::new().unwrap();
        write!(temp, "{}", serde_json::json!({"endpointLimits": {"translate": 3}})).unwrap();
        std::env::set_var("ASSIST_CONFIG", temp.path());
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("translate"));
        clear();
    }
}
