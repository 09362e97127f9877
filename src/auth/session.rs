use axum::http::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::auth::error::IdentityError;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::User;

pub const SESSION_COOKIE: &str = "inkpress_session";

/// What a session knows about its caller. A session carries a logged-in user
/// or a user awaiting email verification, never both; the enum makes the
/// third combination unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionContext {
    Anonymous,
    Bound { user_id: Uuid },
    PendingVerification { user_id: Uuid },
}

impl SessionContext {
    pub(crate) fn from_columns(bound: Option<Uuid>, pending: Option<Uuid>) -> Self {
        match (bound, pending) {
            (Some(user_id), _) => Self::Bound { user_id },
            (None, Some(user_id)) => Self::PendingVerification { user_id },
            (None, None) => Self::Anonymous,
        }
    }

    fn columns(self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            Self::Anonymous => (None, None),
            Self::Bound { user_id } => (Some(user_id), None),
            Self::PendingVerification { user_id } => (None, Some(user_id)),
        }
    }
}

/// Store `ctx` under a fresh opaque token, retiring `prior` in the same
/// transaction so no two tokens carry the caller's identity at once.
/// Returns `None` when the context is anonymous (nothing left to store).
pub async fn persist(
    db: &PgPool,
    prior: Option<Uuid>,
    ctx: SessionContext,
    ttl_minutes: i64,
) -> Result<Option<Uuid>, IdentityError> {
    let mut tx = db.begin().await.map_err(IdentityError::from_sqlx)?;
    if let Some(prior) = prior {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(prior)
            .execute(&mut *tx)
            .await
            .map_err(IdentityError::from_sqlx)?;
    }
    let token = match ctx.columns() {
        (None, None) => None,
        (bound, pending) => {
            let token = Uuid::new_v4();
            let expires_at = OffsetDateTime::now_utc() + Duration::minutes(ttl_minutes);
            sqlx::query(
                r#"
                INSERT INTO sessions (id, bound_user_id, pending_user_id, expires_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(token)
            .bind(bound)
            .bind(pending)
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(IdentityError::from_sqlx)?;
            Some(token)
        }
    };
    tx.commit().await.map_err(IdentityError::from_sqlx)?;
    Ok(token)
}

/// Drop the session binding. Safe to call for tokens that no longer exist.
pub async fn teardown(db: &PgPool, token: Uuid) -> Result<(), IdentityError> {
    sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token)
        .execute(db)
        .await
        .map_err(IdentityError::from_sqlx)?;
    Ok(())
}

/// Resolve a token to its context. Missing or expired sessions are anonymous.
pub async fn context_for(db: &PgPool, token: Uuid) -> Result<SessionContext, IdentityError> {
    let row: Option<(Option<Uuid>, Option<Uuid>)> = sqlx::query_as(
        "SELECT bound_user_id, pending_user_id FROM sessions WHERE id = $1 AND expires_at > now()",
    )
    .bind(token)
    .fetch_optional(db)
    .await
    .map_err(IdentityError::from_sqlx)?;
    Ok(match row {
        Some((bound, pending)) => SessionContext::from_columns(bound, pending),
        None => SessionContext::Anonymous,
    })
}

/// Resolve the session's bound user through the credential store. A bound id
/// that no longer resolves (deleted account) reads as no identity; the
/// session is not revived.
pub async fn current_identity(
    db: &PgPool,
    store: &dyn UserStore,
    token: Uuid,
) -> Result<Option<User>, IdentityError> {
    match context_for(db, token).await? {
        SessionContext::Bound { user_id } => store.find_by_id(user_id).await,
        _ => Ok(None),
    }
}

pub fn build_cookie(
    name: &str,
    value: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, IdentityError> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| IdentityError::Internal(e.into()))
}

pub fn session_cookie(
    token: Uuid,
    ttl_minutes: i64,
    secure: bool,
) -> Result<HeaderValue, IdentityError> {
    build_cookie(SESSION_COOKIE, &token.to_string(), ttl_minutes * 60, secure)
}

pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, IdentityError> {
    build_cookie(SESSION_COOKIE, "", 0, secure)
}

/// Pull the opaque session token from the request: bearer header first, then
/// the session cookie.
pub fn extract_session_token(headers: &HeaderMap) -> Option<Uuid> {
    if let Some(token) = extract_bearer(headers) {
        return token.parse().ok();
    }
    extract_cookie(headers, SESSION_COOKIE)?.parse().ok()
}

pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .trim()
        .strip_prefix("Bearer ")
        .or_else(|| value.trim().strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
