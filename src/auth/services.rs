//! Identity reconciliation: resolves a proof of identity (password match or a
//! provider-asserted profile) to exactly one user record and decides whether
//! the caller gets a logged-in session or is held for email verification.

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::error::IdentityError;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::providers::{NormalizedProfile, Provider};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewFederatedUser, NewLocalUser, User};
use crate::auth::session::SessionContext;
use crate::auth::verification;
use crate::mailer::Mailer;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Outcome of a successful proof of identity.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Identity proven and email verified; a session may be established.
    Verified(User),
    /// Identity proven but verification still owed; hold, no session.
    PendingVerification(Uuid),
}

impl LoginOutcome {
    pub fn context(&self) -> SessionContext {
        match self {
            Self::Verified(user) => SessionContext::Bound { user_id: user.id },
            Self::PendingVerification(user_id) => SessionContext::PendingVerification {
                user_id: *user_id,
            },
        }
    }
}

/// Create an unverified local account with a pending verification cycle.
/// The lookup is a pre-check; the store's uniqueness constraint settles
/// concurrent duplicates.
pub async fn sign_up(
    store: &dyn UserStore,
    mailer: &dyn Mailer,
    form: SignupForm,
) -> Result<(User, SessionContext), IdentityError> {
    let email = normalize_email(&form.email);
    if store.find_by_email(&email).await?.is_some() {
        return Err(IdentityError::EmailTaken);
    }

    let password_hash = hash_password(&form.password)?;
    let issued = verification::issue(OffsetDateTime::now_utc());
    let user = store
        .create_local(NewLocalUser {
            name: form.name.trim().to_string(),
            email,
            password_hash,
            verification_code: issued.code.clone(),
            verification_code_expires: issued.expires_at,
        })
        .await?;

    send_code_email(mailer, &user.email, &issued.code, false).await;
    info!(user_id = %user.id, email = %user.email, "user registered, verification pending");
    let ctx = SessionContext::PendingVerification { user_id: user.id };
    Ok((user, ctx))
}

/// Local path: email + password. A verified account yields a bindable
/// session; an unverified one is held for verification.
pub async fn login_local(
    store: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<LoginOutcome, IdentityError> {
    let email = normalize_email(email);
    let user = store
        .find_by_email(&email)
        .await?
        .ok_or(IdentityError::UnknownAccount)?;

    // Accounts created purely via a provider have no password to match.
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(IdentityError::BadCredentials);
    };
    if !verify_password(password, hash) {
        return Err(IdentityError::BadCredentials);
    }

    if user.email_verified {
        info!(user_id = %user.id, "local login");
        Ok(LoginOutcome::Verified(user))
    } else {
        info!(user_id = %user.id, "local login held for verification");
        Ok(LoginOutcome::PendingVerification(user.id))
    }
}

/// Federated path: the provider already proved the email, so the outcome is
/// always verified. First-seen identities get a fresh account; pre-existing
/// records that predate the verified-at-birth rule are upgraded in place.
pub async fn login_federated(
    store: &dyn UserStore,
    provider: Provider,
    profile: &NormalizedProfile,
) -> Result<User, IdentityError> {
    if let Some(mut user) = store
        .find_by_provider_id(provider, &profile.external_id)
        .await?
    {
        if !user.email_verified {
            user.email_verified = true;
            store.save(&user).await?;
        }
        info!(user_id = %user.id, provider = %provider, "federated login");
        return Ok(user);
    }

    let name = profile
        .display_name
        .clone()
        .or_else(|| profile.username.clone())
        .unwrap_or_default();
    let email = profile
        .email
        .as_deref()
        .map(normalize_email)
        .unwrap_or_default();
    let user = store
        .create_federated(NewFederatedUser {
            name,
            email,
            avatar_url: profile.avatar_url.clone(),
            provider,
            external_id: profile.external_id.clone(),
        })
        .await?;
    info!(user_id = %user.id, provider = %provider, "federated account created");
    Ok(user)
}

/// Verification completion: a matching, unexpired code flips the account to
/// verified exactly once and clears the cycle; the pending hold becomes a
/// logged-in binding.
pub async fn complete_verification(
    store: &dyn UserStore,
    ctx: SessionContext,
    code: &str,
) -> Result<(User, SessionContext), IdentityError> {
    let SessionContext::PendingVerification { user_id } = ctx else {
        return Err(IdentityError::SessionExpired);
    };
    let mut user = store
        .find_by_id(user_id)
        .await?
        .ok_or(IdentityError::SessionExpired)?;

    let now = OffsetDateTime::now_utc();
    if !verification::is_valid(
        code,
        user.verification_code.as_deref(),
        user.verification_code_expires,
        now,
    ) {
        return Err(IdentityError::InvalidOrExpiredCode);
    }

    user.email_verified = true;
    user.verification_code = None;
    user.verification_code_expires = None;
    store.save(&user).await?;
    info!(user_id = %user.id, "email verified");

    let ctx = SessionContext::Bound { user_id: user.id };
    Ok((user, ctx))
}

/// Resend a verification code, subject to the cooldown. The hold stays in
/// place either way.
pub async fn resend_code(
    store: &dyn UserStore,
    mailer: &dyn Mailer,
    ctx: SessionContext,
) -> Result<SessionContext, IdentityError> {
    let SessionContext::PendingVerification { user_id } = ctx else {
        return Err(IdentityError::SessionExpired);
    };
    let mut user = store
        .find_by_id(user_id)
        .await?
        .ok_or(IdentityError::SessionExpired)?;

    let now = OffsetDateTime::now_utc();
    if !verification::resend_permitted(user.verification_code_expires, now) {
        return Err(IdentityError::CooldownActive);
    }

    let issued = verification::issue(now);
    user.verification_code = Some(issued.code.clone());
    user.verification_code_expires = Some(issued.expires_at);
    store.save(&user).await?;

    send_code_email(mailer, &user.email, &issued.code, true).await;
    info!(user_id = %user.id, "verification code reissued");
    Ok(SessionContext::PendingVerification { user_id })
}

/// Delivery is best-effort: a lost email never fails the flow, the caller
/// can always ask for a resend.
async fn send_code_email(mailer: &dyn Mailer, to: &str, code: &str, resend: bool) {
    let (subject, text, html) = if resend {
        (
            "Your new verification code",
            format!("Your new verification code is: {code}"),
            format!("<p>Your new verification code is: <b>{code}</b></p>"),
        )
    } else {
        (
            "Verify your email",
            format!("Your verification code is: {code}"),
            format!("<p>Your verification code is: <strong>{code}</strong></p>"),
        )
    };
    if let Err(e) = mailer.send(to, subject, &text, &html).await {
        warn!(error = %e, to = %to, "verification mail delivery failed");
    }
}
