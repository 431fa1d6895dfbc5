//! HTTP + WebSocket surface.

pub mod poll_observer;
pub mod routes;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::warn;

use crate::jobs::{JobExecutor, StatusNotifier};
use poll_observer::PollObserver;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<JobExecutor>,
    pub notifier: StatusNotifier,
}

/// Router-level settings that are not handler state.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Allowed cross-origin value. `None` leaves CORS off.
    pub allowed_origin: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            allowed_origin: None,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Build the full application router.
///
/// Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// poll observer can see client addresses.
pub fn router(state: AppState, options: &RouterOptions) -> Router {
    let observer = Arc::new(PollObserver::new());

    let app = routes::routes()
        .merge(ws::routes())
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            observer,
            poll_observer::observe_polls,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(options.max_upload_bytes)),
        );

    match options.allowed_origin.as_deref().and_then(cors_layer) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = match HeaderValue::from_str(origin) {
        Ok(value) => value,
        Err(e) => {
            warn!(origin, error = %e, "Invalid FRONTEND_URL, CORS disabled");
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
            .max_age(Duration::from_secs(600)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_rejects_invalid_origin() {
        assert!(cors_layer("http://localhost:3000").is_some());
        assert!(cors_layer("bad\norigin").is_none());
    }
}
