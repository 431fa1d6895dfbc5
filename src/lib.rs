//! Email triage service: classifies emails as productive or unproductive
//! and suggests a reply, running each request as a tracked background job.

pub mod api;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod respond;

use std::sync::Arc;

use api::{AppState, RouterOptions};
use classify::{ClassificationChain, RemoteClassifier, StatisticalClassifier};
use config::ServiceConfig;
use jobs::{JobExecutor, JobStore, StatusNotifier};
use respond::{RemoteResponder, ResponseChain};

/// Wired service components.
pub struct Service {
    pub state: AppState,
    pub store: Arc<JobStore>,
    /// Kept separately so the binary can warm it up at startup.
    pub statistical: Arc<StatisticalClassifier>,
    pub router_options: RouterOptions,
}

impl Service {
    /// Build the classification and response chains, job store, executor and
    /// notifier from configuration.
    pub fn build(config: &ServiceConfig) -> Self {
        let store = JobStore::new();
        let statistical = Arc::new(StatisticalClassifier::new(config.model_path.clone()));

        let classifier = ClassificationChain::new()
            .with_tier(Arc::new(RemoteClassifier::new(config.remote_classifier.clone())))
            .with_tier(statistical.clone());
        let responder = ResponseChain::new()
            .with_tier(Arc::new(RemoteResponder::new(config.remote_generator.clone())));

        let executor = Arc::new(
            JobExecutor::new(Arc::clone(&store), Arc::new(classifier), Arc::new(responder))
                .with_pacing(config.step_pacing),
        );
        let notifier = StatusNotifier::new(Arc::clone(&store), config.stream_interval);

        Self {
            state: AppState { executor, notifier },
            store,
            statistical,
            router_options: RouterOptions {
                allowed_origin: config.allowed_origin.clone(),
                max_upload_bytes: config.max_upload_bytes,
            },
        }
    }

    pub fn router(&self) -> axum::Router {
        api::router(self.state.clone(), &self.router_options)
    }
}
