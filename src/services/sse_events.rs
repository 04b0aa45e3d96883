use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        competition::{CompetitionView, LeaderView, PodiumSlotView, TraysView},
        sse::{PageChangedEvent, PodiumReadyEvent, ServerEvent, SnapshotEvent},
    },
    services::{leader_feed::Leader, podium::Podium},
    state::{SharedState, SseHub, state_machine::Page},
};

const EVENT_SNAPSHOT: &str = "competition.snapshot";
const EVENT_PAGE_CHANGED: &str = "page.changed";
const EVENT_TRAYS_UPDATED: &str = "trays.updated";
const EVENT_LEADER_UPDATED: &str = "leader.updated";
const EVENT_PODIUM_READY: &str = "podium.ready";

/// Broadcast the page the kiosk just moved to.
pub async fn broadcast_page_changed(state: &SharedState, page: Page) {
    let version = state.snapshot().await.version;
    let payload = PageChangedEvent {
        page: page.into(),
        version,
    };
    send_event(state.sse(), EVENT_PAGE_CHANGED, &payload);
}

/// Broadcast the local tray counter after it changed.
pub fn broadcast_trays_updated(state: &SharedState, count: u32) {
    send_event(state.sse(), EVENT_TRAYS_UPDATED, &TraysView::new(count));
}

/// Broadcast a new competition leader.
pub fn broadcast_leader_updated(hub: &SseHub, leader: &Leader) {
    send_event(hub, EVENT_LEADER_UPDATED, &LeaderView::from(leader));
}

/// Broadcast the podium computed when the player finished.
pub fn broadcast_podium_ready(state: &SharedState, podium: &Podium, final_score: u32) {
    let payload = PodiumReadyEvent {
        podium: PodiumSlotView::from_podium(podium),
        final_score,
    };
    send_event(state.sse(), EVENT_PODIUM_READY, &payload);
}

/// Build the snapshot event sent to a single subscriber when it connects.
pub fn snapshot_event(view: CompetitionView) -> Option<ServerEvent> {
    match ServerEvent::json(Some(EVENT_SNAPSHOT.to_string()), &SnapshotEvent(view)) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = EVENT_SNAPSHOT, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
