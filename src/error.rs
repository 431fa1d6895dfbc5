//! Error types for the email triage service.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Caller-facing rejections raised before a job is created.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Provide a file or text for classification")]
    MissingInput,

    #[error("Provide either a file or text, not both")]
    AmbiguousInput,

    #[error(
        "Unsupported document type (content type: {content_type:?}, filename: {filename:?}); only .txt, .pdf and .eml files are accepted"
    )]
    UnsupportedDocument {
        content_type: Option<String>,
        filename: Option<String>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Job registry errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },
}

/// Text extraction failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to process PDF: {0}")]
    Pdf(String),

    #[error("Failed to parse email message: {0}")]
    Email(String),

    #[error("Unsupported document kind: {0}")]
    Unsupported(String),
}

/// A failure inside a running job. The `Display` string is what ends up in
/// `Job.error`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("input too short or empty: {length} characters (minimum {minimum})")]
    InputTooShort { length: usize, minimum: usize },

    #[error("{0}")]
    Store(#[from] JobError),

    #[error("Background task failed: {0}")]
    Join(String),

    #[error("Internal error while processing: {0}")]
    Panicked(String),
}

/// Why a fallback tier produced no answer. Never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("tier disabled: {0}")]
    Disabled(&'static str),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned HTTP {status}")]
    Status { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty output")]
    EmptyOutput,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl From<reqwest::Error> for TierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TierError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            TierError::Status {
                status: status.as_u16(),
            }
        } else {
            TierError::Transport(e.to_string())
        }
    }
}

impl From<rig::completion::CompletionError> for TierError {
    fn from(e: rig::completion::CompletionError) -> Self {
        TierError::Provider(e.to_string())
    }
}

/// Statistical model errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact at {path} is corrupted: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
