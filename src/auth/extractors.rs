use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

use crate::auth::repo_types::User;
use crate::auth::session;
use crate::state::AppState;

/// Extracts the session's bound user. Pending-verification holds and stale
/// bindings are rejected the same as anonymous callers.
pub struct SessionUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session::extract_session_token(&parts.headers)
            .ok_or((StatusCode::UNAUTHORIZED, "Please log in first".to_string()))?;

        let user = session::current_identity(&state.db, state.users.as_ref(), token)
            .await
            .map_err(|e| e.into_parts())?
            .ok_or((StatusCode::UNAUTHORIZED, "Please log in first".to_string()))?;

        Ok(SessionUser(user))
    }
}

/// Like [`SessionUser`], but additionally requires a verified email.
pub struct VerifiedUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for VerifiedUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionUser(user) = SessionUser::from_request_parts(parts, state).await?;
        if !user.email_verified {
            return Err((
                StatusCode::FORBIDDEN,
                "Please verify your email to continue.".to_string(),
            ));
        }
        Ok(VerifiedUser(user))
    }
}
