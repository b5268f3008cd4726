use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::password::{hash_password, verify_password, MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};
use crate::auth::service::{create_user, find_by_email, get_user};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::extract::AppJson;
use crate::models::user::User;
use crate::state::AppState;
use crate::validation::{check_email, check_len, normalize_email};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    check_email("email", &req.email)?;
    check_len("full_name", &req.full_name, 1, 100)?;
    let len = req.password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// POST /api/v1/auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    validate_registration(&req)?;
    let email = normalize_email(&req.email);

    let password_hash =
        hash_password(&req.password).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    let user = create_user(&state.db, &email, &password_hash, req.full_name.trim()).await?;
    info!("Registered user {}", user.id);

    let token = state.jwt.generate_token(user.id, &user.email)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let email = normalize_email(&req.email);
    let user = find_by_email(&state.db, &email).await?.ok_or_else(invalid)?;

    let ok = verify_password(&req.password, &user.password_hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    if !ok {
        return Err(invalid());
    }

    let token = state.jwt.generate_token(user.id, &user.email)?;
    Ok(Json(AuthResponse { token, user }))
}

/// GET /api/v1/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    Ok(Json(get_user(&state.db, auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(email: &str, password: &str, name: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: name.to_string(),
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(validate_registration(&req("ada@acme.io", "longenough", "Ada Lovelace")).is_ok());
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(validate_registration(&req("ada@acme.io", "short", "Ada")).is_err());
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(validate_registration(&req("ada@acme.io", "longenough", "   ")).is_err());
    }

    #[test]
    fn test_bad_email_rejected() {
        assert!(validate_registration(&req("ada", "longenough", "Ada")).is_err());
    }
}
