//! Pull and push access to job status.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::model::JobSnapshot;
use super::store::JobStore;
use crate::error::JobError;

/// Read-only view over the [`JobStore`].
#[derive(Clone)]
pub struct StatusNotifier {
    store: Arc<JobStore>,
    interval: Duration,
}

impl StatusNotifier {
    pub fn new(store: Arc<JobStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Current snapshot, or `NotFound`.
    pub async fn get(&self, id: Uuid) -> Result<JobSnapshot, JobError> {
        self.store.get(id).await
    }

    /// Emit the job's snapshot every interval, starting immediately.
    ///
    /// The stream yields the first terminal snapshot and then ends. It also
    /// ends, without a final item, if the job disappears. Dropping the stream
    /// has no effect on the job.
    pub fn watch(&self, id: Uuid) -> impl Stream<Item = JobSnapshot> + Send + 'static {
        let store = Arc::clone(&self.store);
        let mut interval = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // State is `None` once the terminal snapshot has been emitted.
        stream::unfold(Some(interval), move |state| {
            let store = Arc::clone(&store);
            async move {
                let mut interval = state?;
                interval.tick().await;
                let snapshot = store.get(id).await.ok()?;
                let next = (!snapshot.is_terminal()).then_some(interval);
                Some((snapshot, next))
            }
        })
    }
}
