//! REST endpoints: submission, status, cleanup, health.

use axum::{
    Json, Router,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::error::InputError;
use crate::extract::Document;
use crate::jobs::SubmissionRequest;
use crate::jobs::model::short_id;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/classify-email", post(classify_email))
        .route("/job-status/{job_id}", get(job_status))
        .route("/job/{job_id}", delete(delete_job))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn job_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "job not found")
}

/// Parse a job id path segment. Malformed ids are treated as unknown.
pub(crate) fn parse_job_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

// ── Descriptor / health ─────────────────────────────────────────────────

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": "email-triage",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "classify": "POST /classify-email",
            "job_status": "GET /job-status/{job_id}",
            "job_status_stream": "GET /ws/job-status/{job_id}",
            "delete_job": "DELETE /job/{job_id}",
            "health": "GET /health"
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.executor.store();
    let in_flight = store.in_flight().await;
    let jobs: Vec<String> = in_flight
        .iter()
        .map(|id| format!("{}...", short_id(id)))
        .collect();

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": in_flight.len(),
        "stored_jobs": store.len().await,
        "jobs": jobs,
    }))
}

// ── Submission ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TextBody {
    text: Option<String>,
}

/// Submission extracted from multipart, JSON or urlencoded bodies.
struct Submitted(SubmissionRequest);

impl<S: Send + Sync> FromRequest<S> for Submitted {
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        let bad_request = |e: InputError| error_response(StatusCode::BAD_REQUEST, e.to_string());

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| bad_request(InputError::InvalidRequest(e.body_text())))?;
            read_multipart(multipart).await.map(Submitted).map_err(bad_request)
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<TextBody>::from_request(req, state)
                .await
                .map_err(|e| bad_request(InputError::InvalidRequest(e.body_text())))?;
            Ok(Submitted(SubmissionRequest {
                document: None,
                text: body.text,
            }))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let axum::Form(body) = axum::Form::<TextBody>::from_request(req, state)
                .await
                .map_err(|e| bad_request(InputError::InvalidRequest(e.body_text())))?;
            Ok(Submitted(SubmissionRequest {
                document: None,
                text: body.text,
            }))
        } else {
            Err(bad_request(InputError::MissingInput))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<SubmissionRequest, InputError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        InputError::InvalidRequest(e.body_text())
    };
    let mut request = SubmissionRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid)?;
                // Browsers send an empty, unnamed part when no file is picked.
                if bytes.is_empty() && filename.as_deref().unwrap_or_default().is_empty() {
                    continue;
                }
                request.document = Some(Document::new(bytes.to_vec(), content_type, filename));
            }
            Some("text") => {
                request.text = Some(field.text().await.map_err(invalid)?);
            }
            _ => {}
        }
    }
    Ok(request)
}

async fn classify_email(
    State(state): State<AppState>,
    Submitted(request): Submitted,
) -> Response {
    match state.executor.submit(request).await {
        Ok(snapshot) => {
            info!(job_id = %short_id(&snapshot.job_id), "Submission accepted");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "job_id": snapshot.job_id,
                    "status": snapshot.status,
                    "message": "Job created. Use the job_id to check its status.",
                })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Submission rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

// ── Status / cleanup ────────────────────────────────────────────────────

async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let Some(id) = parse_job_id(&job_id) else {
        return job_not_found();
    };

    match state.notifier.get(id).await {
        Ok(snapshot) => {
            info!(
                job_id = %short_id(&id),
                status = %snapshot.status,
                progress = snapshot.progress,
                "Status requested"
            );
            Json(snapshot).into_response()
        }
        Err(_) => job_not_found(),
    }
}

async fn delete_job(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let Some(id) = parse_job_id(&job_id) else {
        return job_not_found();
    };

    match state.executor.store().delete(id).await {
        Ok(()) => Json(json!({ "message": format!("Job {id} removed") })).into_response(),
        Err(_) => job_not_found(),
    }
}
