//! Submission validation and the per-job pipeline:
//! extract → normalize → classify → respond.
//!
//! Each step boundary writes a status update to the [`JobStore`]. A store
//! update returning `NotFound` means the job was deleted while running; the
//! pipeline stops there without writing anything else. A panic inside the
//! pipeline fails the job instead of leaving it mid-flight.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::model::{JobResult, JobSnapshot, JobStatus, JobUpdate, short_id};
use super::store::JobStore;
use crate::classify::ClassificationChain;
use crate::error::{InputError, JobError, PipelineError};
use crate::extract::{Document, DocumentExtractor, DocumentKind, TextSource, normalize_whitespace};
use crate::respond::ResponseChain;

/// Inputs shorter than this (after normalization) fail the job.
pub const MIN_TEXT_CHARS: usize = 5;

/// Length of the input preview stored in the result.
const PREVIEW_CHARS: usize = 100;

/// Raw caller input, before validation.
#[derive(Debug, Default, Clone)]
pub struct SubmissionRequest {
    pub document: Option<Document>,
    pub text: Option<String>,
}

/// A validated submission: exactly one input form.
#[derive(Debug, Clone)]
pub enum Submission {
    Document { document: Document, kind: DocumentKind },
    Text(String),
}

impl SubmissionRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            document: None,
            text: Some(text.into()),
        }
    }

    pub fn document(document: Document) -> Self {
        Self {
            document: Some(document),
            text: None,
        }
    }

    /// Check that exactly one input form is present and that a document is
    /// of a readable kind. Blank text counts as absent.
    pub fn validate(self) -> Result<Submission, InputError> {
        let text = self
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        match (self.document, text) {
            (Some(_), Some(_)) => Err(InputError::AmbiguousInput),
            (None, None) => Err(InputError::MissingInput),
            (None, Some(text)) => Ok(Submission::Text(text)),
            (Some(document), None) => {
                match DocumentKind::detect(
                    document.content_type.as_deref(),
                    document.filename.as_deref(),
                ) {
                    Some(kind) => Ok(Submission::Document { document, kind }),
                    None => Err(InputError::UnsupportedDocument {
                        content_type: document.content_type,
                        filename: document.filename,
                    }),
                }
            }
        }
    }
}

/// First [`PREVIEW_CHARS`] characters, with an ellipsis if truncated.
fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Runs classification jobs in the background.
pub struct JobExecutor {
    store: Arc<JobStore>,
    extractor: Arc<dyn TextSource>,
    classifier: Arc<ClassificationChain>,
    responder: Arc<ResponseChain>,
    pacing: Duration,
}

impl JobExecutor {
    pub fn new(
        store: Arc<JobStore>,
        classifier: Arc<ClassificationChain>,
        responder: Arc<ResponseChain>,
    ) -> Self {
        Self {
            store,
            extractor: Arc::new(DocumentExtractor::new()),
            classifier,
            responder,
            pacing: Duration::from_millis(200),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextSource>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Pause between pipeline steps. Zero disables pacing.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validate, register a PENDING job, and schedule its pipeline.
    ///
    /// Returns as soon as the job exists. Invalid input creates no job.
    pub async fn submit(
        self: &Arc<Self>,
        request: SubmissionRequest,
    ) -> Result<JobSnapshot, InputError> {
        let submission = request.validate()?;

        let id = Uuid::new_v4();
        let snapshot = self.store.create(id).await;

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.run(id, submission).await;
        });

        info!(job_id = %short_id(&id), "Job scheduled");
        Ok(snapshot)
    }

    /// Drive one job to a terminal status.
    pub async fn run(&self, id: Uuid, submission: Submission) {
        let job_id = short_id(&id);
        info!(job_id = %job_id, "Starting job");

        let pipeline = AssertUnwindSafe(self.pipeline(id, submission))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload);
                error!(job_id = %job_id, panic = %message, "Job pipeline panicked");
                Err(PipelineError::Panicked(message))
            });

        let outcome = match pipeline {
            Ok(result) => self.store.update(id, JobUpdate::completed(result)).await,
            Err(PipelineError::Store(JobError::NotFound { .. })) => {
                info!(job_id = %job_id, "Job deleted while running, stopping");
                return;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job failed");
                self.store.update(id, JobUpdate::failed(e.to_string())).await
            }
        };

        match outcome {
            Ok(snapshot) if snapshot.status == JobStatus::Completed => {
                info!(job_id = %job_id, "Job completed");
            }
            Ok(_) => {}
            Err(JobError::NotFound { .. }) => {
                info!(job_id = %job_id, "Job deleted before its final update");
            }
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to record final job state"),
        }
    }

    async fn step(
        &self,
        id: Uuid,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), PipelineError> {
        self.store
            .update(id, JobUpdate::step(status, progress, message))
            .await?;
        Ok(())
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    async fn pipeline(&self, id: Uuid, submission: Submission) -> Result<JobResult, PipelineError> {
        self.step(id, JobStatus::Processing, 10, "Starting processing").await?;

        let raw = match submission {
            Submission::Document { document, kind } => {
                self.step(
                    id,
                    JobStatus::ExtractingText,
                    20,
                    format!("Extracting text from {} file", kind.label()),
                )
                .await?;
                self.pace().await;

                let extractor = Arc::clone(&self.extractor);
                let text = tokio::task::spawn_blocking(move || extractor.extract(&document))
                    .await
                    .map_err(|e| PipelineError::Join(e.to_string()))??;

                self.step(
                    id,
                    JobStatus::ExtractingText,
                    40,
                    format!("Text extracted: {} characters", text.chars().count()),
                )
                .await?;
                text
            }
            Submission::Text(text) => {
                self.step(
                    id,
                    JobStatus::Processing,
                    30,
                    format!("Text received: {} characters", text.chars().count()),
                )
                .await?;
                text
            }
        };

        let text = normalize_whitespace(&raw);
        let length = text.chars().count();
        if length < MIN_TEXT_CHARS {
            return Err(PipelineError::InputTooShort {
                length,
                minimum: MIN_TEXT_CHARS,
            });
        }

        self.pace().await;
        self.step(id, JobStatus::Classifying, 50, "Classifying email").await?;
        self.step(id, JobStatus::Classifying, 60, "Running classification model")
            .await?;
        let classification = self.classifier.classify(&text).await;
        self.step(id, JobStatus::Classifying, 70, "Classification complete")
            .await?;

        self.step(
            id,
            JobStatus::GeneratingResponse,
            80,
            "Generating suggested response",
        )
        .await?;
        self.pace().await;
        let suggested_response = self
            .responder
            .respond(classification.category, &text)
            .await;
        self.step(id, JobStatus::GeneratingResponse, 95, "Finalizing")
            .await?;

        Ok(JobResult {
            category: classification.category,
            suggested_response,
            confidence: classification.confidence,
            processed_text: preview(&text),
            original_length: length,
        })
    }
}
