use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use recap_agents::{RELAY_BUFFER, RelaySink};
use recap_common::{Error, StatusKind};
use recap_db::SummaryStore;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::state::SharedState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error(err: Error) -> Response {
    warn!("request failed: {err}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// GET /api/status: all records plus the current summary.
pub async fn status(State(state): State<SharedState>) -> Response {
    let records = match state.store.list_records() {
        Ok(records) => records,
        Err(e) => return internal_error(e),
    };
    let summary = match state.store.get_summary() {
        Ok(summary) => summary,
        Err(e) => return internal_error(e),
    };

    Json(json!({
        "statusList": records,
        "summary": summary.text,
        "lastUpdated": summary.last_updated,
    }))
    .into_response()
}

#[derive(Deserialize)]
pub struct CreateStatusRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// POST /api/statuses: add a status record.
pub async fn create_status(
    State(state): State<SharedState>,
    Json(body): Json<CreateStatusRequest>,
) -> Response {
    if body.title.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "title must not be empty");
    }
    let kind = body.kind.as_deref().map(StatusKind::parse).unwrap_or_default();

    match state.store.add_record(&body.title, &body.description, kind) {
        Ok(record) => {
            info!(id = %record.id, kind = kind.as_str(), "status record added");
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub struct ToggleStatusRequest {
    #[serde(default)]
    completed: Option<bool>,
}

/// POST /api/statuses/{id}/toggle: set the completed flag, or flip it when
/// the body carries no `completed` value.
pub async fn toggle_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<ToggleStatusRequest>,
) -> Response {
    let completed = match body.completed {
        Some(value) => value,
        None => match state.store.get_record(&id) {
            Ok(Some(record)) => !record.completed,
            Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("no status record '{id}'")),
            Err(e) => return internal_error(e),
        },
    };

    match state.store.set_completed(&id, completed) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("no status record '{id}'")),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/statuses/{id}
pub async fn delete_status(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match state.store.delete_record(&id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, format!("no status record '{id}'")),
        Err(e) => internal_error(e),
    }
}

/// POST /api/generate-summary-stream: run one generation and relay it as SSE.
///
/// The pipeline runs in its own task; dropping the response stream closes
/// the relay channel, which the pipeline treats as a disconnect.
pub async fn generate_summary_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, rx) = RelaySink::channel(RELAY_BUFFER);
    let runtime = Arc::clone(&state.runtime);

    tokio::spawn(async move {
        match runtime.generate(sink).await {
            Ok(outcome) => debug!(model = %outcome.model, "stream finished"),
            Err(Error::Cancelled) => info!("summary stream cancelled by caller"),
            Err(e) => warn!("summary stream failed: {e}"),
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json().to_string())));

    Sse::new(stream)
}

/// GET /api/history: past generation exchanges, oldest first.
pub async fn history(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let entries = state.runtime.history();
    Json(json!({
        "count": entries.len(),
        "history": entries,
    }))
}

/// DELETE /api/history
pub async fn clear_history(State(state): State<SharedState>) -> Response {
    match state.runtime.clear_history() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => internal_error(e),
    }
}
