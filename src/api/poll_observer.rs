//! Log-only observation of rapid status polling.
//!
//! Repeated polls of the same job by the same client within
//! [`REPEAT_WINDOW`] are logged as warnings. Requests are never rejected.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

/// Polls closer together than this are flagged.
pub const REPEAT_WINDOW: Duration = Duration::from_millis(500);

/// Entries idle for longer than this are pruned.
const RETENTION: Duration = Duration::from_secs(60);

const OBSERVED_PREFIX: &str = "/job-status/";

/// Tracks the last poll time per client + path.
pub struct PollObserver {
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl PollObserver {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a poll. Returns `true` if it repeats within [`REPEAT_WINDOW`].
    pub async fn observe(&self, client: &str, path: &str) -> bool {
        self.observe_at(client, path, Instant::now()).await
    }

    async fn observe_at(&self, client: &str, path: &str, now: Instant) -> bool {
        let key = format!("{client}:{path}");
        let mut last_seen = self.last_seen.lock().await;

        last_seen.retain(|_, seen| now.saturating_duration_since(*seen) < RETENTION);

        let rapid = last_seen
            .get(&key)
            .is_some_and(|seen| now.saturating_duration_since(*seen) < REPEAT_WINDOW);
        if rapid {
            warn!(client, path, "Rapid status polling detected");
        }
        last_seen.insert(key, now);
        rapid
    }

    pub async fn tracked(&self) -> usize {
        self.last_seen.lock().await.len()
    }
}

impl Default for PollObserver {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware feeding `/job-status/` requests to the observer.
pub async fn observe_polls(
    State(observer): State<Arc<PollObserver>>,
    request: Request,
    next: Next,
) -> Response {
    if request.uri().path().starts_with(OBSERVED_PREFIX) {
        let client = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".into());
        observer.observe(&client, request.uri().path()).await;
    }
    next.run(request).await
}
