//! WebSocket push stream of job status.

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use super::routes::parse_job_id;
use crate::jobs::StatusNotifier;
use crate::jobs::model::short_id;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws/job-status/{job_id}", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let id = parse_job_id(&job_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state.notifier, id))
}

async fn send_json(socket: &mut WebSocket, value: &impl serde::Serialize) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WS payload");
            false
        }
    }
}

async fn handle_socket(mut socket: WebSocket, notifier: StatusNotifier, id: Option<Uuid>) {
    let known = match id {
        Some(id) => notifier.get(id).await.ok().map(|_| id),
        None => None,
    };
    let Some(id) = known else {
        debug!("WS subscription for unknown job");
        send_json(&mut socket, &serde_json::json!({ "error": "job not found" })).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let job_id = short_id(&id);
    info!(job_id = %job_id, "WS status stream opened");

    let mut updates = Box::pin(notifier.watch(id));
    loop {
        tokio::select! {
            next = updates.next() => {
                match next {
                    Some(snapshot) => {
                        if !send_json(&mut socket, &snapshot).await {
                            debug!(job_id = %job_id, "Client disconnected during send");
                            return;
                        }
                        if snapshot.is_terminal() {
                            info!(job_id = %job_id, status = %snapshot.status, "Closing WS stream, job finished");
                        }
                    }
                    None => break,
                }
            }

            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(job_id = %job_id, "WS client disconnected");
                        return;
                    }
                    Some(Err(e)) => {
                        warn!(job_id = %job_id, error = %e, "WebSocket error");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    info!(job_id = %job_id, "WS status stream closed");
}
