use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    models::{
        exchange::{ChoiceRequest, Position, SubmitOutcome},
        ChoiceAccepted, ExchangeView,
    },
    services::AppState,
};

/// GET /api/v1/exchange
pub async fn list_entries(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ExchangeView {
        entries: state.exchange.snapshot(),
        open_prompts: state.exchange.open_prompts(),
    })
}

/// POST /api/v1/exchange/{position}/choice
pub async fn submit_choice(
    State(state): State<Arc<AppState>>,
    Path(position): Path<Position>,
    Json(req): Json<ChoiceRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Choice submitted for prompt {}", position);

    match state.exchange.submit_choice(position, req.into()) {
        SubmitOutcome::Consumed => Ok((
            StatusCode::ACCEPTED,
            Json(ChoiceAccepted {
                position,
                status: "consumed",
            }),
        )),
        SubmitOutcome::NotFound => Err((
            StatusCode::NOT_FOUND,
            format!("No entry at position {}", position),
        )),
        SubmitOutcome::AlreadyAnswered => Err((
            StatusCode::CONFLICT,
            format!("Prompt {} was already answered", position),
        )),
        SubmitOutcome::NotAPrompt => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Entry {} is not a prompt", position),
        )),
        SubmitOutcome::InvalidSelection => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Selection does not match prompt {}", position),
        )),
    }
}

/// GET /api/v1/session
pub async fn get_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.session.borrow().clone();
    Json(snapshot)
}
