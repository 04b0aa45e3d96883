use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{
    services::{competition_service, sse_events, sse_service},
    state::SharedState,
};

/// Stream kiosk events, starting with a snapshot of the current view.
pub async fn competition_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!("New competition SSE connection");
    let view = competition_service::current_view(&state).await;
    let initial = sse_events::snapshot_event(view).into_iter().collect();
    sse_service::broadcast_info(state.sse(), "competition stream connected");
    sse_service::to_sse_stream(receiver, initial)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/competition", get(competition_stream))
}
