use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use stoodio_shared::DomainEvent;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/events/stream", get(event_stream))
}

/// Live domain events involving the caller. Lagged receivers skip ahead.
async fn event_stream(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) => to_sse(&event, user_id).map(Ok),
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &DomainEvent, user_id: Uuid) -> Option<Event> {
    if !event.involves(user_id) {
        return None;
    }
    match event.to_payload() {
        Ok(data) => Some(Event::default().event(event.topic()).data(data)),
        Err(e) => {
            tracing::warn!("Dropping unserializable event {}: {}", event.topic(), e);
            None
        }
    }
}
