use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    pub role: i16,
    pub avatar: String,
    pub picture: String,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub const ROLE_USER: i16 = 0;
    pub const ROLE_ADMIN: i16 = 1;

    pub fn is_admin(&self) -> bool {
        self.role == Self::ROLE_ADMIN
    }
}

/// Fields for a new account; which ones are set depends on the sign-up path.
#[derive(Debug, Default)]
pub struct NewUser {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub avatar: Option<String>,
    pub is_email_verified: bool,
}

/// Partial profile update; `None` leaves a column unchanged.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<i16>,
}
