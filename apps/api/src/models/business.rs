use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::storage::StoredFile;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BusinessRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub industry: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub company_size: Option<String>,
    pub founded_year: Option<i32>,
    pub logo: Option<Json<StoredFile>>,
    #[serde(skip_serializing)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberRow {
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvitationRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub email: String,
    pub role: String,
    /// Delivered out of band; never echoed in listings.
    #[serde(skip_serializing)]
    pub token: String,
    pub invited_by: Uuid,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
