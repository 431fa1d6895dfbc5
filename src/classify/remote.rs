//! Remote classification tier backed by a hosted inference endpoint.
//!
//! The endpoint returns label/score pairs, either nested per input
//! (`[[{label, score}, ...]]`) or flat (`[{label, score}, ...]`). The
//! top-scoring label is mapped onto a [`Category`].

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Category, ClassificationResult, ClassifierTier};
use crate::config::RemoteClassifierConfig;
use crate::error::TierError;

/// Characters of input sent to the endpoint.
const MAX_INPUT_CHARS: usize = 512;

/// Labels that indicate the message needs attention.
const PRODUCTIVE_LABELS: &[&str] = &["label_0", "label_1", "negative", "neutral"];

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Classifier tier calling a remote inference API.
pub struct RemoteClassifier {
    config: Option<RemoteClassifierConfig>,
    client: reqwest::Client,
}

impl RemoteClassifier {
    /// A `None` config yields a tier that always reports itself disabled.
    ///
    /// If an HTTP client with the configured timeout cannot be built, the
    /// tier is disabled rather than run without a timeout.
    pub fn new(config: Option<RemoteClassifierConfig>) -> Self {
        let Some(config) = config else {
            return Self::disabled();
        };
        match reqwest::Client::builder().timeout(config.timeout).build() {
            Ok(client) => Self {
                config: Some(config),
                client,
            },
            Err(e) => {
                warn!(error = %e, "Failed to build remote classifier client, tier disabled");
                Self::disabled()
            }
        }
    }

    fn disabled() -> Self {
        Self {
            config: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }
}

fn map_label(label: &str) -> Category {
    let label = label.to_lowercase();
    if PRODUCTIVE_LABELS.contains(&label.as_str()) {
        Category::Productive
    } else {
        Category::Unproductive
    }
}

/// Pick the best label from either payload shape.
fn parse_payload(payload: Value) -> Result<ClassificationResult, TierError> {
    let candidates = match payload {
        Value::Array(items) if matches!(items.first(), Some(Value::Array(_))) => {
            items.into_iter().next().unwrap_or_default()
        }
        Value::Array(items) => Value::Array(items),
        Value::Object(obj) if obj.contains_key("error") => {
            return Err(TierError::Malformed(format!(
                "endpoint reported error: {}",
                obj["error"]
            )));
        }
        other => {
            return Err(TierError::Malformed(format!(
                "expected a list of label scores, got {other}"
            )));
        }
    };

    let scores: Vec<LabelScore> = serde_json::from_value(candidates)
        .map_err(|e| TierError::Malformed(e.to_string()))?;

    let best = scores
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| TierError::Malformed("no labels returned".into()))?;

    Ok(ClassificationResult::new(
        map_label(&best.label),
        Some(best.score),
    ))
}

#[async_trait]
impl ClassifierTier for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn classify(&self, text: &str) -> Result<ClassificationResult, TierError> {
        let config = self
            .config
            .as_ref()
            .ok_or(TierError::Disabled("HF_API_KEY not set"))?;

        let inputs: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let body = json!({
            "inputs": inputs,
            "parameters": { "wait_for_model": true }
        });

        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                TierError::Timeout(config.timeout)
            } else {
                e.into()
            }
        };

        let response = self
            .client
            .post(&config.api_url)
            .bearer_auth(config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(timed_out)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TierError::Status {
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await.map_err(timed_out)?;
        debug!(%payload, "Remote classifier response");
        parse_payload(payload)
    }
}
