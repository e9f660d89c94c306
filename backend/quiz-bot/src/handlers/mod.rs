use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = state.session.borrow().clone();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "quiz-bot",
            "version": env!("CARGO_PKG_VERSION"),
            "entries": state.exchange.len(),
            "quiz_active": session.quiz_id.is_some()
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

pub mod exchange;
pub mod sse;
