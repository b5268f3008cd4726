use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::connections::service::{self, ConnectionStatus};
use crate::errors::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::connection::ConnectionRow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub addressee_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectionQuery {
    pub status: Option<ConnectionStatus>,
}

/// POST /api/v1/connections
pub async fn handle_request_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(req): AppJson<ConnectRequest>,
) -> Result<(StatusCode, Json<ConnectionRow>), AppError> {
    let row = service::request_connection(&state.db, auth.user_id, req.addressee_id).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// POST /api/v1/connections/:id/accept
pub async fn handle_accept_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ConnectionRow>, AppError> {
    Ok(Json(
        service::respond(&state.db, id, auth.user_id, ConnectionStatus::Accepted).await?,
    ))
}

/// POST /api/v1/connections/:id/reject
pub async fn handle_reject_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ConnectionRow>, AppError> {
    Ok(Json(
        service::respond(&state.db, id, auth.user_id, ConnectionStatus::Rejected).await?,
    ))
}

/// GET /api/v1/connections
pub async fn handle_list_connections(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(query): AppQuery<ConnectionQuery>,
) -> Result<Json<Vec<ConnectionRow>>, AppError> {
    Ok(Json(
        service::list_connections(&state.db, auth.user_id, query.status).await?,
    ))
}

/// DELETE /api/v1/connections/:id
pub async fn handle_delete_connection(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    service::delete_connection(&state.db, id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
