use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::competition::{AthletesResponse, CompetitionView, RegisterRequest, TraysView},
    error::AppError,
    services::competition_service,
    state::SharedState,
};

/// Routes driving the kiosk pages.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/competition", get(current))
        .route("/competition/athletes", get(athletes))
        .route("/competition/register", post(register))
        .route("/competition/chomp", post(chomp))
        .route("/competition/finish", post(finish))
        .route("/competition/restart", post(restart))
        .route("/competition/reset", post(reset))
}

/// Everything needed to render the current page.
pub async fn current(State(state): State<SharedState>) -> Json<CompetitionView> {
    Json(competition_service::current_view(&state).await)
}

/// Athletes a player can pick at registration.
pub async fn athletes() -> Json<AthletesResponse> {
    Json(AthletesResponse::all())
}

/// Register a new player and start the game.
pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<CompetitionView>, AppError> {
    let view = competition_service::register(&state, payload).await?;
    Ok(Json(view))
}

/// One more tray eaten.
pub async fn chomp(State(state): State<SharedState>) -> Result<Json<TraysView>, AppError> {
    let trays = competition_service::increment(&state).await?;
    Ok(Json(trays))
}

/// Save the final score and show the podium.
pub async fn finish(State(state): State<SharedState>) -> Result<Json<CompetitionView>, AppError> {
    let view = competition_service::finish(&state).await?;
    Ok(Json(view))
}

/// Play again with a zeroed score.
pub async fn restart(State(state): State<SharedState>) -> Result<Json<CompetitionView>, AppError> {
    let view = competition_service::restart(&state).await?;
    Ok(Json(view))
}

/// Forget the player and go back to registration.
pub async fn reset(State(state): State<SharedState>) -> Result<Json<CompetitionView>, AppError> {
    let view = competition_service::reset_to_registration(&state).await?;
    Ok(Json(view))
}
