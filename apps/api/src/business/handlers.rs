use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::business::service::{self, BusinessFilter};
use crate::errors::AppError;
use crate::extract::{AppPath, AppQuery};
use crate::models::business::BusinessRow;
use crate::pagination::{Page, PageParams};
use crate::state::AppState;
use crate::upload::Payload;

/// POST /api/v1/businesses
pub async fn handle_create_business(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Payload,
) -> Result<(StatusCode, Json<BusinessRow>), AppError> {
    let (fields, mut form) = payload.into_parts(&[])?;
    let logo = form.take_file("logo");
    let row =
        service::create_business(&state.db, state.storage.as_ref(), auth.user_id, fields, logo)
            .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/businesses/:id
pub async fn handle_get_business(
    State(state): State<AppState>,
    AppPath(business_id): AppPath<Uuid>,
) -> Result<Json<BusinessRow>, AppError> {
    Ok(Json(service::get_business(&state.db, business_id).await?))
}

/// GET /api/v1/businesses
pub async fn handle_list_businesses(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PageParams>,
    AppQuery(filter): AppQuery<BusinessFilter>,
) -> Result<Json<Page<BusinessRow>>, AppError> {
    Ok(Json(service::list_businesses(&state.db, &filter, &params).await?))
}

/// GET /api/v1/me/businesses
pub async fn handle_my_businesses(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<BusinessRow>>, AppError> {
    Ok(Json(service::list_my_businesses(&state.db, auth.user_id).await?))
}

/// PUT /api/v1/businesses/:id
pub async fn handle_update_business(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
    payload: Payload,
) -> Result<Json<BusinessRow>, AppError> {
    let (fields, mut form) = payload.into_parts(&[])?;
    let logo = form.take_file("logo");
    if fields.is_empty() && logo.is_none() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }
    let row = service::update_business(
        &state.db,
        state.storage.as_ref(),
        business_id,
        auth.user_id,
        fields,
        logo,
    )
    .await?;
    Ok(Json(row))
}

/// DELETE /api/v1/businesses/:id
pub async fn handle_delete_business(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    service::delete_business(&state.db, state.storage.as_ref(), business_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
