//! Server-sent event streams

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tracing::debug;
use uuid::Uuid;

use super::hotels::find_hotel;
use crate::{error::ApiResult, events::event_stream, state::AppState};

/// Every hotel event, for list pages
pub async fn all(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(event_stream(state.events.subscribe(), None)).keep_alive(KeepAlive::default())
}

/// Events for an open hotel page; the client counts as a viewer while connected
pub async fn hotel_live(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    find_hotel(&state, id).await?;

    // Subscribe before joining so the client sees its own viewers-update
    let receiver = state.events.subscribe();
    let guard = state.viewers.join(id);
    debug!("Viewer joined hotel {}", id);

    Ok(Sse::new(event_stream(receiver, Some(guard))).keep_alive(KeepAlive::default()))
}
