use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::providers::Provider;

pub const DEFAULT_AVATAR: &str = "/images/default-user.png";

/// Authorization tier, mutated only by administrative tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

/// Account lifecycle flag, mutated only by administrative tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
    Pending,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Lowercased at creation; empty string for federated accounts whose
    /// provider shared no address.
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub avatar_url: String,
    pub google_id: Option<String>,
    pub twitter_id: Option<String>,
    pub github_id: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    #[serde(skip_serializing)]
    pub verification_code_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Twitter => self.twitter_id.as_deref(),
            Provider::Github => self.github_id.as_deref(),
        }
    }
}

/// Creation shape for a local-credential signup: always unverified, with a
/// verification cycle already pending.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verification_code: String,
    pub verification_code_expires: OffsetDateTime,
}

/// Creation shape for a first-seen federated identity: no password, verified
/// at birth.
#[derive(Debug, Clone)]
pub struct NewFederatedUser {
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub provider: Provider,
    pub external_id: String,
}
