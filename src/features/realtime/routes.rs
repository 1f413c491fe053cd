use axum::{routing::get, Router};

use crate::features::realtime::handlers::{stream_handler, StreamState};

pub fn routes(state: StreamState) -> Router {
    Router::new()
        .route("/api/events/stream", get(stream_handler::event_stream))
        .with_state(state)
}
