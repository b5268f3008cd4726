use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::{AppJson, AppPath};
use crate::models::business::{InvitationRow, MemberRow};
use crate::state::AppState;
use crate::team::roles::TeamRole;
use crate::team::service::{self, NewInvitation};

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: TeamRole,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub invitation: InvitationRow,
    /// Shared with the invitee by the inviter; returned only once.
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: TeamRole,
}

/// GET /api/v1/businesses/:id/members
pub async fn handle_list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
) -> Result<Json<Vec<MemberRow>>, AppError> {
    service::require_role(&state.db, business_id, auth.user_id, TeamRole::Member).await?;
    Ok(Json(service::list_members(&state.db, business_id).await?))
}

/// POST /api/v1/businesses/:id/invitations
pub async fn handle_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
    AppJson(req): AppJson<InviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), AppError> {
    let invitation = service::create_invitation(
        &state.db,
        business_id,
        auth.user_id,
        NewInvitation {
            email: req.email,
            role: req.role,
        },
        state.config.invitation_ttl_hours,
    )
    .await?;
    let token = invitation.token.clone();
    Ok((StatusCode::CREATED, Json(InviteResponse { invitation, token })))
}

/// GET /api/v1/businesses/:id/invitations
pub async fn handle_list_invitations(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
) -> Result<Json<Vec<InvitationRow>>, AppError> {
    Ok(Json(
        service::list_pending_invitations(&state.db, business_id, auth.user_id).await?,
    ))
}

/// DELETE /api/v1/businesses/:id/invitations/:invitation_id
pub async fn handle_revoke_invitation(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((business_id, invitation_id)): AppPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    service::revoke_invitation(&state.db, business_id, invitation_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/invitations/accept
pub async fn handle_accept_invitation(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(req): AppJson<AcceptRequest>,
) -> Result<Json<MemberRow>, AppError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AppError::Validation("token is required".to_string()));
    }
    Ok(Json(
        service::accept_invitation(&state.db, token, auth.user_id, &auth.email).await?,
    ))
}

/// PATCH /api/v1/businesses/:id/members/:user_id
pub async fn handle_change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((business_id, user_id)): AppPath<(Uuid, Uuid)>,
    AppJson(req): AppJson<RoleChangeRequest>,
) -> Result<StatusCode, AppError> {
    service::change_role(&state.db, business_id, auth.user_id, user_id, req.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/businesses/:id/members/:user_id
pub async fn handle_remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((business_id, user_id)): AppPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    service::remove_member(&state.db, business_id, auth.user_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
