//! Operations driving the kiosk through registration, the game and the ceremony.

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dao::{
        competition_store::PlayerQuery,
        models::{CompetitionEntity, NewPlayerEntity, PlayerPatch},
    },
    dto::competition::{
        CompetitionView, LeaderView, PlayerView, PodiumSlotView, RegisterRequest, TraysView,
    },
    error::ServiceError,
    identity,
    services::{
        podium::Podium,
        sse_events::{broadcast_podium_ready, broadcast_trays_updated},
    },
    state::{
        SharedState,
        session::{LocalSession, PlayerRef},
        state_machine::{CompetitionEvent, Page},
        transitions::run_transition_with_broadcast,
    },
};

/// Register a new player for today's competition and start the game.
pub async fn register(
    state: &SharedState,
    request: RegisterRequest,
) -> Result<CompetitionView, ServiceError> {
    request.validate()?;
    let name = request.trimmed_name().to_string();
    let athlete = request
        .athlete()
        .ok_or_else(|| ServiceError::InvalidState("athlete is not recognised".into()))?;

    let competition_id = run_transition_with_broadcast(
        state,
        CompetitionEvent::Register,
        move || async move {
            let now = OffsetDateTime::now_utc();
            let competition_id = identity::competition_id_for(now);

            state
                .store()
                .upsert_competition(CompetitionEntity::new(
                    competition_id.clone(),
                    identity::utc_date(now),
                ))
                .await
                .map_err(ServiceError::RemoteWrite)?;

            let session_id = identity::resolve_session_id(state.sessions())?;
            let player = state
                .store()
                .add_player(
                    &competition_id,
                    NewPlayerEntity {
                        name,
                        icon: athlete.as_str().to_string(),
                        session_id,
                    },
                )
                .await
                .map_err(ServiceError::RemoteWrite)?;

            info!(
                %competition_id,
                player_id = %player.id,
                name = %player.name,
                athlete = %athlete,
                "player registered"
            );

            state
                .session()
                .write()
                .await
                .bind(competition_id.clone(), &player, false);
            *state.podium().write().await = None;
            Ok(competition_id)
        },
    )
    .await?;

    state.leader().attach(&competition_id).await;
    Ok(current_view(state).await)
}

/// Count one more tray. The remote score follows after the sync delay.
pub async fn increment(state: &SharedState) -> Result<TraysView, ServiceError> {
    let count = {
        let mut session = state.session().write().await;
        state.check_transition(CompetitionEvent::Increment).await?;
        let target = bound_player(&session)?;

        session.trays += 1;
        state.score_sync().schedule(target, session.trays);
        // Announced under the lock so concurrent increments broadcast in count order.
        broadcast_trays_updated(state, session.trays);
        session.trays
    };

    debug!(trays = count, "tray added");
    Ok(TraysView::new(count))
}

/// Save the final score, mark the player done and show the podium.
pub async fn finish(state: &SharedState) -> Result<CompetitionView, ServiceError> {
    let podium_size = state.config().podium_size;
    let bound = state.session().read().await.player_ref();

    let outcome = run_transition_with_broadcast(
        state,
        CompetitionEvent::Finish,
        move || async move {
            let (target, trays) = {
                let session = state.session().read().await;
                (bound_player(&session)?, session.trays)
            };

            state
                .score_sync()
                .write_now(target.clone(), PlayerPatch::finish(trays))
                .await
                .map_err(ServiceError::RemoteWrite)?;

            let ranked = match state
                .store()
                .query_players(&target.competition_id, PlayerQuery::top(podium_size))
                .await
            {
                Ok(ranked) => ranked,
                Err(err) => {
                    warn!(
                        competition_id = %target.competition_id,
                        error = %err,
                        "podium query failed; staying in game"
                    );
                    if let Err(reactivate_err) = state
                        .score_sync()
                        .write_now(target, PlayerPatch::active(true))
                        .await
                    {
                        warn!(error = %reactivate_err, "failed to mark player active again");
                    }
                    return Err(ServiceError::RemoteRead(err));
                }
            };

            let podium = Podium::from_ranked(&ranked, podium_size);
            *state.podium().write().await = Some(podium.clone());
            info!(
                player_id = %target.player_id,
                final_score = trays,
                ranked = ranked.len(),
                "player finished"
            );
            Ok((podium, trays))
        },
    )
    .await;

    let (podium, final_score) = match outcome {
        Err(ServiceError::Timeout) => {
            // The finish write may still land after the timeout; queue the undo behind it.
            if let Some(target) = bound {
                warn!(player_id = %target.player_id, "finish timed out; marking player active again");
                state
                    .score_sync()
                    .write_detached(target, PlayerPatch::active(true));
            }
            return Err(ServiceError::Timeout);
        }
        outcome => outcome?,
    };

    broadcast_podium_ready(state, &podium, final_score);
    Ok(current_view(state).await)
}

/// Zero the score and play again as the same player.
pub async fn restart(state: &SharedState) -> Result<CompetitionView, ServiceError> {
    let bound = state.session().read().await.player_ref();

    let outcome =
        run_transition_with_broadcast(state, CompetitionEvent::Restart, move || async move {
            let target = bound_player(&*state.session().read().await)?;

            state
                .score_sync()
                .write_now(target.clone(), PlayerPatch::restart())
                .await
                .map_err(ServiceError::RemoteWrite)?;

            {
                let mut session = state.session().write().await;
                session.trays = 0;
                broadcast_trays_updated(state, 0);
            }
            *state.podium().write().await = None;
            info!(player_id = %target.player_id, "player restarted");
            Ok(())
        })
        .await;

    if let Err(ServiceError::Timeout) = outcome {
        // The kiosk stays on the ceremony; put the finished score back behind the late restart.
        if let Some(target) = bound {
            let trays = state.session().read().await.trays;
            warn!(player_id = %target.player_id, trays, "restart timed out; restoring final score");
            state
                .score_sync()
                .write_detached(target, PlayerPatch::finish(trays));
        }
    }
    outcome?;

    Ok(current_view(state).await)
}

/// Forget the player and the session id, and go back to registration.
pub async fn reset_to_registration(state: &SharedState) -> Result<CompetitionView, ServiceError> {
    run_transition_with_broadcast(state, CompetitionEvent::Reset, move || async move {
        identity::discard_session_id(state.sessions())?;
        state.score_sync().cancel();
        state.leader().detach().await;
        state.session().write().await.clear();
        *state.podium().write().await = None;
        info!("session discarded; back to registration");
        Ok(())
    })
    .await?;

    Ok(current_view(state).await)
}

/// Resume a player registered earlier today from this kiosk's session.
///
/// Returns whether a player was restored. Failures are logged and leave the kiosk on the
/// registration page.
pub async fn restore_session(state: &SharedState) -> bool {
    if let Err(err) = state.check_transition(CompetitionEvent::Restore).await {
        debug!(error = ?err, "skipping session restoration");
        return false;
    }

    let competition_id = identity::resolve_competition_id();
    let session_id = match identity::resolve_session_id(state.sessions()) {
        Ok(session_id) => session_id,
        Err(err) => {
            warn!(error = %err, "could not read session id; starting fresh");
            return false;
        }
    };

    let lookup = state
        .store()
        .query_players(&competition_id, PlayerQuery::by_session(session_id.clone()));
    let found = match state.config().transition_timeout {
        Some(limit) => match tokio::time::timeout(limit, lookup).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%competition_id, "session restoration timed out; starting fresh");
                return false;
            }
        },
        None => lookup.await,
    };

    let player = match found {
        Ok(players) => players.into_iter().next(),
        Err(err) => {
            warn!(%competition_id, error = %err, "session restoration failed; starting fresh");
            return false;
        }
    };

    let Some(player) = player else {
        info!(%competition_id, %session_id, "no returning player for this session");
        return false;
    };

    let bound = run_transition_with_broadcast(
        state,
        CompetitionEvent::Restore,
        move || async move {
            state
                .session()
                .write()
                .await
                .bind(competition_id.clone(), &player, true);
            info!(
                %competition_id,
                player_id = %player.id,
                score = player.score,
                "returning player restored"
            );
            Ok(competition_id)
        },
    )
    .await;

    match bound {
        Ok(competition_id) => {
            state.leader().attach(&competition_id).await;
            true
        }
        Err(err) => {
            warn!(error = %err, "could not enter the game for the returning player");
            false
        }
    }
}

/// Everything the front end needs to render the current page.
pub async fn current_view(state: &SharedState) -> CompetitionView {
    let snapshot = state.snapshot().await;
    let session = state.session().read().await.clone();
    let podium = state.podium().read().await.clone();
    let ceremony = snapshot.page == Page::Ceremony;

    CompetitionView {
        page: snapshot.page.into(),
        version: snapshot.version,
        competition_id: session.competition_id.clone(),
        date: identity::display_date(OffsetDateTime::now_utc()),
        player: session
            .player
            .as_ref()
            .map(|player| PlayerView::new(player, session.returning)),
        trays: TraysView::new(session.trays),
        leader: state.leader().current().as_ref().map(LeaderView::from),
        podium: podium
            .filter(|_| ceremony)
            .map(|podium| PodiumSlotView::from_podium(&podium)),
        final_score: ceremony.then_some(session.trays),
    }
}

fn bound_player(session: &LocalSession) -> Result<PlayerRef, ServiceError> {
    session
        .player_ref()
        .ok_or_else(|| ServiceError::InvalidState("no player is bound to this kiosk".into()))
}
