use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Identity-resolution failures surfaced by the reconciliation engine and the
/// credential store.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Email not registered")]
    UnknownAccount,

    #[error("Password incorrect")]
    BadCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Account already linked to this provider identity")]
    ProviderIdTaken,

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("Invalid or expired verification code.")]
    InvalidOrExpiredCode,

    #[error("Please wait before requesting a new code.")]
    CooldownActive,

    #[error("{0}")]
    Validation(String),

    #[error("credential store unavailable")]
    StoreUnavailable(#[source] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IdentityError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Map a store-level error, folding uniqueness violations into the
    /// matching taxonomy entry by constraint name.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return match db_err.constraint() {
                    Some(name) if name.contains("email") => Self::EmailTaken,
                    Some(_) => Self::ProviderIdTaken,
                    None => Self::StoreUnavailable(err),
                };
            }
        }
        Self::StoreUnavailable(err)
    }

    /// Status + user-facing message, for rejections built outside
    /// `IntoResponse` (extractors).
    pub fn into_parts(self) -> (StatusCode, String) {
        (self.status(), self.public_message())
    }

    fn status(&self) -> StatusCode {
        match self {
            // Unknown account and bad password are indistinguishable outward.
            Self::UnknownAccount | Self::BadCredentials => StatusCode::UNAUTHORIZED,
            Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::EmailTaken | Self::ProviderIdTaken => StatusCode::CONFLICT,
            Self::InvalidOrExpiredCode | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::CooldownActive => StatusCode::TOO_MANY_REQUESTS,
            Self::StoreUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::UnknownAccount | Self::BadCredentials => "Invalid credentials".to_string(),
            Self::StoreUnavailable(_) | Self::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        match &self {
            Self::StoreUnavailable(source) => {
                tracing::error!(error = %source, "credential store failure")
            }
            Self::Internal(source) => tracing::error!(error = %source, "internal failure"),
            _ => {}
        }
        (self.status(), self.public_message()).into_response()
    }
}
