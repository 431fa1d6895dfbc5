//! Configuration types, built from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Hugging Face inference endpoint for the remote classification tier.
pub const DEFAULT_HF_API_URL: &str =
    "https://api-inference.huggingface.co/models/cardiffnlp/twitter-roberta-base-sentiment";

/// Default base URL for the Gemini REST API.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Default location of the persisted statistical classifier.
pub const DEFAULT_MODEL_PATH: &str = "models/classifier_model.json";

/// Remote classification endpoint configuration.
#[derive(Debug, Clone)]
pub struct RemoteClassifierConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl RemoteClassifierConfig {
    /// Build from env. Returns `None` when `HF_API_KEY` is unset, which
    /// disables the remote classification tier.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_var("HF_API_KEY")?;
        let api_url = non_empty_var("HF_API_URL").unwrap_or_else(|| DEFAULT_HF_API_URL.to_string());

        Some(Self {
            api_url,
            api_key: SecretString::from(api_key),
            timeout: remote_timeout(),
        })
    }
}

/// Remote reply-generation configuration.
#[derive(Debug, Clone)]
pub struct RemoteGeneratorConfig {
    pub api_base: String,
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
}

impl RemoteGeneratorConfig {
    /// Build from env. Both `GEMINI_API_KEY` and `GEMINI_MODEL` must be set.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_var("GEMINI_API_KEY")?;
        let model = non_empty_var("GEMINI_MODEL")?;
        let api_base =
            non_empty_var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string());

        Some(Self {
            api_base,
            api_key: SecretString::from(api_key),
            model,
            timeout: remote_timeout(),
        })
    }
}

/// Service-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Allowed cross-origin value. `None` disables the CORS layer.
    pub allowed_origin: Option<String>,
    pub model_path: PathBuf,
    pub remote_classifier: Option<RemoteClassifierConfig>,
    pub remote_generator: Option<RemoteGeneratorConfig>,
    /// Terminal jobs older than this are evicted.
    pub job_ttl: Duration,
    pub sweep_interval: Duration,
    /// Deliberate pause between pipeline steps.
    pub step_pacing: Duration,
    /// Cadence of the push status stream.
    pub stream_interval: Duration,
    pub max_upload_bytes: usize,
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            allowed_origin: None,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            remote_classifier: None,
            remote_generator: None,
            job_ttl: Duration::from_secs(3600), // 1 hour
            sweep_interval: Duration::from_secs(60),
            step_pacing: Duration::from_millis(200),
            stream_interval: Duration::from_secs(1),
            max_upload_bytes: 10 * 1024 * 1024,
            log_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment. Unset keys use defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match non_empty_var("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "BIND_ADDR".into(),
                message: format!("{e}"),
            })?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            bind_addr,
            allowed_origin: non_empty_var("FRONTEND_URL"),
            model_path: non_empty_var("CLASSIFIER_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            remote_classifier: RemoteClassifierConfig::from_env(),
            remote_generator: RemoteGeneratorConfig::from_env(),
            job_ttl: parsed_var("JOB_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_ttl),
            sweep_interval: parsed_var("JOB_SWEEP_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            step_pacing: parsed_var("PIPELINE_PACING_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_pacing),
            stream_interval: parsed_var("STATUS_STREAM_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.stream_interval),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_upload_bytes),
            log_dir: non_empty_var("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn remote_timeout() -> Duration {
    Duration::from_secs(parsed_var("REMOTE_TIMEOUT_SECS").unwrap_or(30))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var(key: &str) -> Option<u64> {
    non_empty_var(key).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.stream_interval, Duration::from_secs(1));
        assert!(config.remote_classifier.is_none());
        assert!(config.remote_generator.is_none());
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }

    #[test]
    fn remote_generator_requires_model_name() {
        // SAFETY: No other test reads these variables.
        unsafe {
            std::env::set_var("GEMINI_API_KEY", "test-key");
            std::env::remove_var("GEMINI_MODEL");
        }
        assert!(RemoteGeneratorConfig::from_env().is_none());
        unsafe { std::env::remove_var("GEMINI_API_KEY") };
    }

    #[test]
    fn zero_sweep_interval_keeps_default() {
        // SAFETY: No other test reads this variable.
        unsafe { std::env::set_var("JOB_SWEEP_INTERVAL_SECS", "0") };
        let config = ServiceConfig::from_env().unwrap();
        unsafe { std::env::remove_var("JOB_SWEEP_INTERVAL_SECS") };
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn blank_values_count_as_unset() {
        // SAFETY: No other test reads this variable.
        unsafe { std::env::set_var("EMAIL_TRIAGE_TEST_BLANK", "   ") };
        assert!(non_empty_var("EMAIL_TRIAGE_TEST_BLANK").is_none());
        unsafe { std::env::remove_var("EMAIL_TRIAGE_TEST_BLANK") };
    }
}
