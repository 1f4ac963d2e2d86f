use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/upstream", get(upstream_health))
        .route("/api/status", get(api::status))
        .route("/api/statuses", post(api::create_status))
        .route("/api/statuses/{id}", axum::routing::delete(api::delete_status))
        .route("/api/statuses/{id}/toggle", post(api::toggle_status))
        .route(
            "/api/generate-summary-stream",
            post(api::generate_summary_stream),
        )
        .route("/api/history", get(api::history).delete(api::clear_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

/// GET /health/upstream: whether the LLM provider answers.
async fn upstream_health(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> axum::Json<serde_json::Value> {
    let healthy = state.runtime.upstream_healthy().await;
    axum::Json(serde_json::json!({
        "upstream": healthy,
        "models": state.runtime.orchestrator().models(),
    }))
}
