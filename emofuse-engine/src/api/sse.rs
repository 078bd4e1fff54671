//! Server-Sent Events stream of fusion events
//!
//! `GET /events` streams every event; `GET /events?room=<id>` streams one
//! room's events plus engine-wide ones (config updates, global resets).

use crate::api::handlers::RoomQuery;
use crate::api::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{debug, warn};

/// GET /events - SSE event stream
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.engine.subscribe(query.room);
    debug!("New SSE client connected ({})", subscription.id());

    let stream = subscription.into_stream().filter_map(|event| async move {
        match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
            Err(e) => {
                warn!("Failed to serialize event: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("keep-alive"),
    )
}
