use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::onboarding::tour::{advance, Tour, TourAction, TourState};

pub async fn load_state(pool: &PgPool, user_id: Uuid, tour: Tour) -> Result<TourState, AppError> {
    let state: Option<Json<TourState>> =
        sqlx::query_scalar("SELECT state FROM tour_progress WHERE user_id = $1 AND tour = $2")
            .bind(user_id)
            .bind(tour.as_str())
            .fetch_optional(pool)
            .await?;
    Ok(state.map(|s| s.0).unwrap_or_default())
}

pub async fn apply_action(
    pool: &PgPool,
    user_id: Uuid,
    tour: Tour,
    action: TourAction,
) -> Result<TourState, AppError> {
    let current = load_state(pool, user_id, tour).await?;
    let next = advance(tour, current, action)?;

    sqlx::query(
        r#"
        INSERT INTO tour_progress (user_id, tour, state)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, tour) DO UPDATE SET state = EXCLUDED.state, updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(tour.as_str())
    .bind(Json(next))
    .execute(pool)
    .await?;

    debug!("Tour {} for {user_id}: {current:?} -> {next:?}", tour.as_str());
    Ok(next)
}
