//! Background classification jobs: records, registry, pipeline and status.

pub mod executor;
pub mod model;
pub mod notifier;
pub mod store;

pub use executor::{JobExecutor, Submission, SubmissionRequest};
pub use model::{Job, JobResult, JobSnapshot, JobStatus, JobUpdate};
pub use notifier::StatusNotifier;
pub use store::{JobStore, spawn_eviction_task};
