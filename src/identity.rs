//! Competition and session identifiers.
//!
//! Every kiosk derives the same competition id from the UTC date, so players converge on one
//! competition per day without coordination. The session id binds a kiosk to its player and
//! survives restarts through the local [`SessionStore`].

use time::{OffsetDateTime, UtcOffset, macros::format_description};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::session_store::{SessionStore, SessionStoreError};

/// Key under which the session identifier is persisted.
pub const SESSION_KEY: &str = "raclette_session_id";

/// UTC calendar date (`YYYY-MM-DD`) of `at`.
pub fn utc_date(at: OffsetDateTime) -> String {
    let date = at.to_offset(UtcOffset::UTC).date();
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Competition identifier for the UTC day containing `at`.
pub fn competition_id_for(at: OffsetDateTime) -> String {
    format!("comp-{}", utc_date(at))
}

/// Competition identifier for today (UTC).
pub fn resolve_competition_id() -> String {
    competition_id_for(OffsetDateTime::now_utc())
}

/// Human readable UTC date, e.g. `Friday, October 16, 2026`.
pub fn display_date(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[weekday repr:long], [month repr:long] [day padding:none], [year]"
        ))
        .unwrap_or_else(|err| {
            warn!(error = %err, "failed to format display date");
            utc_date(at)
        })
}

/// Return the persisted session id, generating and persisting a fresh one when absent.
pub fn resolve_session_id(store: &dyn SessionStore) -> Result<String, SessionStoreError> {
    if let Some(existing) = store.get(SESSION_KEY)?.filter(|id| !id.is_empty()) {
        return Ok(existing);
    }

    let session_id = Uuid::new_v4().to_string();
    store.set(SESSION_KEY, &session_id)?;
    info!(session_id = %session_id, "generated new session id");
    Ok(session_id)
}

/// Forget the session id so the next resolution starts a brand-new session.
pub fn discard_session_id(store: &dyn SessionStore) -> Result<(), SessionStoreError> {
    store.remove(SESSION_KEY)
}
