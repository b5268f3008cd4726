use axum::{
    extract::State,
    Json,
};

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{AppJson, AppPath};
use crate::onboarding::service;
use crate::onboarding::tour::{Tour, TourAction, TourView};
use crate::state::AppState;

/// GET /api/v1/onboarding/:tour
pub async fn handle_get_tour(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(tour): AppPath<Tour>,
) -> Result<Json<TourView>, AppError> {
    let current = service::load_state(&state.db, auth.user_id, tour).await?;
    Ok(Json(TourView::new(tour, current)))
}

/// POST /api/v1/onboarding/:tour
pub async fn handle_tour_action(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(tour): AppPath<Tour>,
    AppJson(action): AppJson<TourAction>,
) -> Result<Json<TourView>, AppError> {
    let next = service::apply_action(&state.db, auth.user_id, tour, action).await?;
    Ok(Json(TourView::new(tour, next)))
}
