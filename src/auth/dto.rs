use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::User;

/// Request body for signup.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Request body for local login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for verification-code submission.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

/// Query parameters on an OAuth callback.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    pub email_verified: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            email_verified: user.email_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// "ok" for a logged-in session, "verification_required" for a hold.
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::{AccountStatus, Role};
    use time::OffsetDateTime;

    #[test]
    fn public_user_hides_credentials() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: Some("hash".into()),
            avatar_url: "/images/default-user.png".into(),
            google_id: None,
            twitter_id: None,
            github_id: None,
            role: Role::User,
            status: AccountStatus::Active,
            email_verified: true,
            verification_code: Some("123456".into()),
            verification_code_expires: Some(now),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("ada@example.com"));
        assert!(!json.contains("hash"));
        assert!(!json.contains("123456"));
    }

    #[test]
    fn login_response_omits_absent_user() {
        let json = serde_json::to_string(&LoginResponse {
            status: "verification_required",
            message: "Please verify your email to continue.".into(),
            user: None,
        })
        .unwrap();
        assert!(!json.contains("user"));
    }
}
