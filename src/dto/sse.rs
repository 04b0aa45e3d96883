use serde::Serialize;

use crate::dto::competition::{CompetitionView, PageView, PodiumSlotView};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Event carrying raw text data.
    pub fn new<E>(event: E, data: String) -> Self
    where
        E: Into<Option<String>>,
    {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
/// Full view pushed to a front end when it connects.
pub struct SnapshotEvent(pub CompetitionView);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// Broadcast whenever the kiosk moves to another page.
pub struct PageChangedEvent {
    pub page: PageView,
    pub version: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// Broadcast when the player finished and the podium is known.
pub struct PodiumReadyEvent {
    pub podium: Vec<PodiumSlotView>,
    pub final_score: u32,
}
