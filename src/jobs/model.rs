//! Job records and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::Category;

/// Pipeline status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, pipeline not yet started.
    Pending,
    /// Pipeline started, input being prepared.
    Processing,
    /// Reading text out of an uploaded document.
    ExtractingText,
    Classifying,
    GeneratingResponse,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Position in the pipeline. `Failed` sits outside the ordering.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::ExtractingText => Some(2),
            Self::Classifying => Some(3),
            Self::GeneratingResponse => Some(4),
            Self::Completed => Some(5),
            Self::Failed => None,
        }
    }

    /// Check if this status allows moving to `target`.
    ///
    /// Status only moves forward (steps may be skipped or repeated for
    /// progress updates). `Failed` is reachable from any non-terminal status.
    /// Terminal statuses never change.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), target.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to >= from,
            (None, Some(_)) => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::ExtractingText => "extracting_text",
            Self::Classifying => "classifying",
            Self::GeneratingResponse => "generating_response",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Output of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub category: Category,
    pub suggested_response: String,
    pub confidence: Option<f32>,
    /// Preview of the processed input.
    pub processed_text: String,
    /// Character count of the processed input.
    pub original_length: usize,
}

/// A tracked classification job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// 0..=100
    pub progress: u8,
    pub current_step: String,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            current_step: "Job created".into(),
            message: "Processing started".into(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// First 8 characters of the id, used in logs and health output.
    pub fn short_id(&self) -> String {
        short_id(&self.id)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            status: self.status,
            progress: self.progress,
            current_step: self.current_step.clone(),
            message: self.message.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Format a job id prefix for logs.
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Point-in-time view of a job, as served to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Replacement for a job's mutable fields.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// An intermediate pipeline step.
    pub fn step(status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            result: None,
            error: None,
        }
    }

    pub fn completed(result: JobResult) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: 100,
            message: "Processing completed".into(),
            result: Some(result),
            error: None,
        }
    }

    /// Failure carrying `error` verbatim.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: JobStatus::Failed,
            progress: 0,
            message: "Processing failed".into(),
            result: None,
            error: Some(error),
        }
    }
}
