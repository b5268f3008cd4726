use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::applications::models::{ApplicationStatus, ApplyFields};
use crate::applications::service::{self, ApplicationFilter};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::job::ApplicationRow;
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::upload::Payload;
use crate::validation::from_json;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ApplicationStatus,
}

/// POST /api/v1/jobs/:id/applications
pub async fn handle_apply(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
    payload: Payload,
) -> Result<(StatusCode, Json<ApplicationRow>), AppError> {
    let (fields, mut form) = payload.into_parts(&[])?;
    let resume = form.take_file("resume");
    let fields: ApplyFields = from_json("application", serde_json::Value::Object(fields))?;

    let row = service::apply(
        &state.db,
        state.storage.as_ref(),
        job_id,
        auth.user_id,
        fields,
        resume,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/jobs/:id/applications
pub async fn handle_list_job_applications(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(job_id): AppPath<Uuid>,
    AppQuery(params): AppQuery<PageParams>,
    AppQuery(filter): AppQuery<ApplicationFilter>,
) -> Result<Json<Page<ApplicationRow>>, AppError> {
    Ok(Json(
        service::list_for_job(&state.db, job_id, auth.user_id, &filter, &params).await?,
    ))
}

/// GET /api/v1/me/applications
pub async fn handle_my_applications(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<Page<ApplicationRow>>, AppError> {
    Ok(Json(service::list_mine(&state.db, auth.user_id, &params).await?))
}

/// PATCH /api/v1/applications/:id/status
pub async fn handle_review_application(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(application_id): AppPath<Uuid>,
    AppJson(req): AppJson<StatusRequest>,
) -> Result<Json<ApplicationRow>, AppError> {
    Ok(Json(
        service::review(&state.db, application_id, auth.user_id, req.status).await?,
    ))
}

/// POST /api/v1/applications/:id/withdraw
pub async fn handle_withdraw_application(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(application_id): AppPath<Uuid>,
) -> Result<Json<ApplicationRow>, AppError> {
    Ok(Json(
        service::withdraw(&state.db, application_id, auth.user_id).await?,
    ))
}
