use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::service::get_user;
use crate::errors::AppError;
use crate::models::connection::ConnectionRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Rejected => "rejected",
        }
    }
}

/// Who may answer a request, and only while it is pending.
pub fn check_can_respond(row: &ConnectionRow, user_id: Uuid) -> Result<(), AppError> {
    if row.addressee_id != user_id {
        return Err(AppError::Forbidden(
            "Only the addressee can answer a connection request".to_string(),
        ));
    }
    if row.status != ConnectionStatus::Pending.as_str() {
        return Err(AppError::Validation(format!(
            "Connection request is already {}",
            row.status
        )));
    }
    Ok(())
}

fn is_party(row: &ConnectionRow, user_id: Uuid) -> bool {
    row.requester_id == user_id || row.addressee_id == user_id
}

async fn get_connection(pool: &PgPool, id: Uuid) -> Result<ConnectionRow, AppError> {
    sqlx::query_as::<_, ConnectionRow>("SELECT * FROM connections WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {id} not found")))
}

pub async fn request_connection(
    pool: &PgPool,
    requester_id: Uuid,
    addressee_id: Uuid,
) -> Result<ConnectionRow, AppError> {
    if requester_id == addressee_id {
        return Err(AppError::Validation(
            "You cannot connect with yourself".to_string(),
        ));
    }
    get_user(pool, addressee_id).await?;

    let existing: Option<String> = sqlx::query_scalar(
        r#"
        SELECT status FROM connections
        WHERE status IN ('pending', 'accepted')
          AND ((requester_id = $1 AND addressee_id = $2)
            OR (requester_id = $2 AND addressee_id = $1))
        LIMIT 1
        "#,
    )
    .bind(requester_id)
    .bind(addressee_id)
    .fetch_optional(pool)
    .await?;
    if let Some(status) = existing {
        return Err(AppError::Conflict(format!(
            "A connection between these users is already {status}"
        )));
    }

    let row = sqlx::query_as::<_, ConnectionRow>(
        r#"
        INSERT INTO connections (id, requester_id, addressee_id, status)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(requester_id)
    .bind(addressee_id)
    .bind(ConnectionStatus::Pending.as_str())
    .fetch_one(pool)
    .await?;
    info!("User {requester_id} requested a connection with {addressee_id}");
    Ok(row)
}

pub async fn respond(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    answer: ConnectionStatus,
) -> Result<ConnectionRow, AppError> {
    let row = get_connection(pool, id).await?;
    if !is_party(&row, user_id) {
        return Err(AppError::NotFound(format!("Connection {id} not found")));
    }
    check_can_respond(&row, user_id)?;

    let row = sqlx::query_as::<_, ConnectionRow>(
        r#"
        UPDATE connections SET status = $2, updated_at = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(answer.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Connection request was already answered".to_string()))?;
    info!("Connection {id} {}", answer.as_str());
    Ok(row)
}

pub async fn list_connections(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<ConnectionStatus>,
) -> Result<Vec<ConnectionRow>, AppError> {
    Ok(sqlx::query_as::<_, ConnectionRow>(
        r#"
        SELECT * FROM connections
        WHERE (requester_id = $1 OR addressee_id = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY updated_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?)
}

pub async fn delete_connection(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    let row = get_connection(pool, id).await?;
    if !is_party(&row, user_id) {
        return Err(AppError::NotFound(format!("Connection {id} not found")));
    }
    sqlx::query("DELETE FROM connections WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    info!("Connection {id} removed by {user_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(status: ConnectionStatus) -> ConnectionRow {
        ConnectionRow {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            addressee_id: Uuid::new_v4(),
            status: status.as_str().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_addressee_answers() {
        let r = row(ConnectionStatus::Pending);
        assert!(check_can_respond(&r, r.addressee_id).is_ok());
        assert!(matches!(
            check_can_respond(&r, r.requester_id),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_answered_request_is_final() {
        let r = row(ConnectionStatus::Accepted);
        assert!(matches!(
            check_can_respond(&r, r.addressee_id),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_party_check() {
        let r = row(ConnectionStatus::Pending);
        assert!(is_party(&r, r.requester_id));
        assert!(!is_party(&r, Uuid::new_v4()));
    }
}
