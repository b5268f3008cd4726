use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{AppMultipart, AppPath};
use crate::models::profile::ProfileRow;
use crate::profile::assets::{ProfileUploads, SELECTOR_FIELDS};
use crate::profile::completeness::{compute_completeness_report, CompletenessReport};
use crate::profile::service;
use crate::state::AppState;
use crate::upload::{read_form, Payload};

/// POST /api/v1/profile/create
pub async fn handle_create_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Payload,
) -> Result<(StatusCode, Json<ProfileRow>), AppError> {
    let (fields, mut form) = payload.into_parts(SELECTOR_FIELDS)?;
    let uploads = ProfileUploads::from_form(&mut form)?;

    let row = service::create_profile(
        &state.db,
        state.storage.as_ref(),
        auth.user_id,
        fields,
        uploads,
    )
    .await?;
    state.cache.invalidate(auth.user_id).await;
    Ok((StatusCode::CREATED, Json(row)))
}

/// PUT /api/v1/profile/edit
pub async fn handle_edit_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Payload,
) -> Result<Json<ProfileRow>, AppError> {
    let (fields, mut form) = payload.into_parts(SELECTOR_FIELDS)?;
    let uploads = ProfileUploads::from_form(&mut form)?;
    if fields.is_empty() && uploads.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }

    let row = service::edit_profile(
        &state.db,
        state.storage.as_ref(),
        auth.user_id,
        fields,
        uploads,
    )
    .await?;
    state.cache.invalidate(auth.user_id).await;
    Ok(Json(row))
}

/// GET /api/v1/profile/:user_id
pub async fn handle_get_profile(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    if let Some(cached) = state.cache.get(user_id).await {
        return Ok(Json(cached));
    }

    let row = service::get_profile(&state.db, user_id).await?;
    let value = serde_json::to_value(&row).map_err(anyhow::Error::from)?;
    state.cache.put(user_id, &value).await;
    Ok(Json(value))
}

/// GET /api/v1/profile/me/completeness
pub async fn handle_profile_completeness(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CompletenessReport>, AppError> {
    let row = service::get_profile(&state.db, auth.user_id).await?;
    Ok(Json(compute_completeness_report(&row.document)))
}

/// PUT /api/v1/profile/certifications/:cert_id/certificate
pub async fn handle_upload_certificate(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(cert_id): AppPath<Uuid>,
    AppMultipart(multipart): AppMultipart,
) -> Result<Json<ProfileRow>, AppError> {
    let mut form = read_form(multipart).await?;
    let file = form
        .take_file("certificate")
        .ok_or_else(|| AppError::Validation("certificate file is required".to_string()))?;

    let row = service::attach_certificate(
        &state.db,
        state.storage.as_ref(),
        auth.user_id,
        cert_id,
        &file,
    )
    .await?;
    state.cache.invalidate(auth.user_id).await;
    Ok(Json(row))
}

/// DELETE /api/v1/profile/certifications/:cert_id/certificate
pub async fn handle_delete_certificate(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(cert_id): AppPath<Uuid>,
) -> Result<Json<ProfileRow>, AppError> {
    let row =
        service::detach_certificate(&state.db, state.storage.as_ref(), auth.user_id, cert_id)
            .await?;
    state.cache.invalidate(auth.user_id).await;
    Ok(Json(row))
}

/// DELETE /api/v1/profile
pub async fn handle_delete_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    service::delete_profile(&state.db, state.storage.as_ref(), auth.user_id).await?;
    state.cache.invalidate(auth.user_id).await;
    Ok(StatusCode::NO_CONTENT)
}
