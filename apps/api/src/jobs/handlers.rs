use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::errors::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::jobs::service::{self, JobFilter};
use crate::models::job::JobRow;
use crate::pagination::{Page, PageParams};
use crate::state::AppState;

/// POST /api/v1/businesses/:id/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
    AppJson(fields): AppJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<JobRow>), AppError> {
    let row = service::create_job(&state.db, business_id, auth.user_id, fields).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PageParams>,
    AppQuery(filter): AppQuery<JobFilter>,
) -> Result<Json<Page<JobRow>>, AppError> {
    Ok(Json(service::list_open_jobs(&state.db, &filter, &params).await?))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<Json<JobRow>, AppError> {
    let viewer = viewer.map(|v| v.user_id);
    Ok(Json(service::get_job(&state.db, job_id, viewer).await?))
}

/// PUT /api/v1/jobs/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
    AppJson(fields): AppJson<Map<String, Value>>,
) -> Result<Json<JobRow>, AppError> {
    if fields.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }
    Ok(Json(service::update_job(&state.db, job_id, auth.user_id, fields).await?))
}

/// DELETE /api/v1/jobs/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    service::delete_job(&state.db, job_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
