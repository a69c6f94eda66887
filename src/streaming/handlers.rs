use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::Stream;
use std::convert::Infallible;
use tracing::{debug, info};

use super::server::ServerState;

/// Long-lived SSE stream: one `data:` message per notification
pub async fn events_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.broadcaster.subscribe();
    let shutdown = state.shutdown.clone();

    info!(
        "SSE client {} connected ({} total)",
        subscription.id(),
        state.broadcaster.subscriber_count()
    );

    let stream = async_stream::stream! {
        loop {
            let next = tokio::select! {
                payload = subscription.recv() => payload,
                _ = shutdown.cancelled() => None,
            };

            match next {
                Some(payload) => {
                    yield Ok::<_, Infallible>(Event::default().data(&*payload));
                }
                None => break,
            }
        }

        debug!("SSE stream for client {} closed", subscription.id());
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Current pipeline status as JSON
pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.status.snapshot())
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.status.snapshot();

    let health_info = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": snapshot.uptime_seconds,
        "frames_processed": snapshot.frames_processed,
        "burst_active": snapshot.burst_active,
        "subscribers": state.broadcaster.subscriber_count(),
    });

    (StatusCode::OK, Json(health_info))
}
