//! Server-Sent Events for session changes

use crate::session::Session;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Extension,
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /api/auth/events
///
/// Streams `SignedIn`, `SignedOut`, `TokenRefreshed` and `SessionExpired`
/// for the authenticated user.
pub async fn session_events(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    alumnos_common::sse::session_event_stream(state.sessions.subscribe(), session.user_id())
}
