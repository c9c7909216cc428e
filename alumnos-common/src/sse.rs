//! Server-Sent Events (SSE) utilities

use crate::events::SessionEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stream session events for one user as SSE
///
/// Sends an initial `ConnectionStatus` event, then every [`SessionEvent`]
/// whose user matches `user_id`. Lagged receivers skip the dropped events
/// and keep streaming; the stream ends when the bus is dropped.
///
/// # Example
/// ```rust,ignore
/// pub async fn session_events(
///     State(state): State<AppState>,
///     Extension(session): Extension<Session>,
/// ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     alumnos_common::sse::session_event_stream(state.sessions.subscribe(), session.user_id())
/// }
/// ```
pub fn session_event_stream(
    mut rx: broadcast::Receiver<SessionEvent>,
    user_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to session events ({})", user_id);

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) if event.user_id() == user_id => {
                    let data = match serde_json::to_string(&event) {
                        Ok(data) => data,
                        Err(e) => {
                            warn!("SSE: failed to serialize session event: {}", e);
                            continue;
                        }
                    };
                    debug!("SSE: sending {}", event.event_type());
                    yield Ok(Event::default().event(event.event_type()).data(data));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SSE: client lagged, skipped {} session events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
