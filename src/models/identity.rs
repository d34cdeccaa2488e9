use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Authenticated identity with its granted role set, hydrated once per
/// request from the credential store.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Identity {
    pub id: i64,
    /// Opaque, immutable external id. Tokens and policy subjects use this,
    /// never the numeric primary key.
    pub uuid: Uuid,
    pub username: String,
    pub nickname: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub enabled: bool,
    pub multi_login: bool,
    #[schema(value_type = Vec<i64>)]
    pub role_ids: HashSet<i64>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Policy subject string for this identity.
    pub fn subject(&self) -> String {
        self.uuid.to_string()
    }
}

/// Policy subject string for a role.
pub fn role_subject(role_id: i64) -> String {
    format!("role:{role_id}")
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    pub nickname: String,
    pub password_hash: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub enabled: bool,
    pub multi_login: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl DbUser {
    pub fn into_identity(self, role_ids: HashSet<i64>) -> Identity {
        Identity {
            id: self.id,
            uuid: self.uuid,
            username: self.username,
            nickname: self.nickname,
            is_superuser: self.is_superuser,
            is_staff: self.is_staff,
            enabled: self.enabled,
            multi_login: self.multi_login,
            role_ids,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Identity,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}
