use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::{sse::Event, IntoResponse, Response, Sse},
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::core::error::{AppError, Result};
use crate::features::auth::model::AuthenticatedUser;
use crate::features::realtime::fanout::{ConnectionGuard, Fanout};

/// State for the push stream handler
#[derive(Clone)]
pub struct StreamState {
    pub fanout: Arc<Fanout>,
    pub keepalive: Duration,
}

/// Long-lived SSE stream of assignment events for the authenticated volunteer
#[utoipa::path(
    get,
    path = "/api/events/stream",
    responses(
        (status = 200, description = "SSE stream of assignment events", content_type = "text/event-stream"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - volunteer role required")
    ),
    security(("bearer_auth" = [])),
    tag = "realtime"
)]
pub async fn event_stream(
    user: AuthenticatedUser,
    State(state): State<StreamState>,
) -> Result<Response> {
    if !user.is_volunteer() {
        return Err(AppError::Forbidden(
            "Volunteer role required for the event stream".to_string(),
        ));
    }

    let (handle, rx) = state.fanout.add_connection(&user.sub);
    let guard = ConnectionGuard::new(Arc::clone(&state.fanout), handle);

    // The guard travels with the stream closure; whichever side ends the
    // connection, dropping the stream runs cleanup exactly once.
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _held = &guard;
        let sse = match Event::default().event(event.kind()).json_data(&event) {
            Ok(sse) => sse,
            Err(e) => {
                tracing::warn!("Failed to serialize push event: {}", e);
                Event::default().event("error").data("serialization failed")
            }
        };
        Ok::<_, Infallible>(sse)
    });

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(state.keepalive)
            .text("ping"),
    );

    Ok(sse.into_response())
}
