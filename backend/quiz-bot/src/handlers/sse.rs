use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{models::exchange::LogEvent, services::AppState};

/// SSE endpoint for exchange log events
/// GET /api/v1/exchange/stream
pub async fn exchange_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!(
        "Client connected to exchange stream ({} entries so far)",
        state.exchange.len()
    );

    let stream = create_log_stream(state.events.subscribe());
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Create a stream of log events; ends when the log is gone
fn create_log_stream(
    rx: broadcast::Receiver<LogEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        let event = match rx.recv().await {
            Ok(log_event) => Event::default()
                .event(log_event.event_name())
                .data(log_event.to_sse_data()),
            Err(RecvError::Lagged(skipped)) => {
                // client re-syncs from GET /api/v1/exchange
                tracing::warn!("Exchange stream lagged, skipped {} events", skipped);
                Event::default()
                    .event("resync")
                    .data(format!("{{\"skipped\":{}}}", skipped))
            }
            Err(RecvError::Closed) => {
                tracing::info!("Exchange stream closed");
                return None;
            }
        };
        Some((Ok(event), rx))
    })
}
