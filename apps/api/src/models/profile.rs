use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::profile::models::ProfileDocument;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProfileRow {
    pub user_id: Uuid,
    #[serde(rename = "profile")]
    pub document: Json<ProfileDocument>,
    /// Bumped on every write; edits only land on the version they read.
    #[serde(skip_serializing)]
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
