use axum::{
    extract::{Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            CallbackParams, LoginRequest, LoginResponse, MessageResponse, PublicUser,
            SignupRequest, SignupResponse, VerifyEmailRequest,
        },
        error::IdentityError,
        extractors::SessionUser,
        providers::{self, Provider},
        services::{self, LoginOutcome, SignupForm},
        session::{self, SessionContext},
    },
    config::{AppConfig, ProviderConfig},
    state::AppState,
};

const OAUTH_STATE_COOKIE: &str = "inkpress_oauth_state";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-code", post(resend_code))
        .route("/auth/:provider", get(oauth_start))
        .route("/auth/:provider/callback", get(oauth_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

fn provider_config(config: &AppConfig, provider: Provider) -> Option<&ProviderConfig> {
    match provider {
        Provider::Google => config.google.as_ref(),
        Provider::Twitter => config.twitter.as_ref(),
        Provider::Github => config.github.as_ref(),
    }
}

fn callback_uri(config: &AppConfig, provider: Provider) -> String {
    format!(
        "{}/auth/{provider}/callback",
        config.base_url.trim_end_matches('/')
    )
}

#[instrument(skip(state, headers, payload))]
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignupRequest>,
) -> Result<Response, IdentityError> {
    let email = services::normalize_email(&payload.email);
    if payload.name.trim().is_empty() {
        return Err(IdentityError::validation("Name is required"));
    }
    if !services::is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(IdentityError::validation("Invalid email"));
    }
    if payload.password.len() < 8 {
        return Err(IdentityError::validation("Password too short"));
    }
    if payload.password != payload.confirm_password {
        return Err(IdentityError::validation("Passwords do not match"));
    }

    let (user, ctx) = services::sign_up(
        state.users.as_ref(),
        state.mailer.as_ref(),
        SignupForm {
            name: payload.name,
            email,
            password: payload.password,
        },
    )
    .await?;

    let prior = session::extract_session_token(&headers);
    let ttl = state.config.session.ttl_minutes;
    let token = session::persist(&state.db, prior, ctx, ttl).await?;

    let mut out = HeaderMap::new();
    if let Some(token) = token {
        out.insert(
            SET_COOKIE,
            session::session_cookie(token, ttl, state.config.session.cookie_secure)?,
        );
    }
    Ok((
        StatusCode::CREATED,
        out,
        Json(SignupResponse {
            message: "Registered! Please verify your email.".into(),
            user: PublicUser::from(&user),
        }),
    )
        .into_response())
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, IdentityError> {
    let outcome =
        services::login_local(state.users.as_ref(), &payload.email, &payload.password).await?;

    let prior = session::extract_session_token(&headers);
    let ttl = state.config.session.ttl_minutes;
    let token = session::persist(&state.db, prior, outcome.context(), ttl).await?;

    let mut out = HeaderMap::new();
    if let Some(token) = token {
        out.insert(
            SET_COOKIE,
            session::session_cookie(token, ttl, state.config.session.cookie_secure)?,
        );
    }
    let body = match outcome {
        LoginOutcome::Verified(user) => LoginResponse {
            status: "ok",
            message: "Logged in.".into(),
            user: Some(PublicUser::from(&user)),
        },
        LoginOutcome::PendingVerification(_) => LoginResponse {
            status: "verification_required",
            message: "Please verify your email to continue.".into(),
            user: None,
        },
    };
    Ok((out, Json(body)).into_response())
}

#[instrument(skip(state, headers, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Response, IdentityError> {
    let prior = session::extract_session_token(&headers);
    let ctx = match prior {
        Some(token) => session::context_for(&state.db, token).await?,
        None => SessionContext::Anonymous,
    };

    let (user, next) =
        services::complete_verification(state.users.as_ref(), ctx, payload.code.trim()).await?;

    let ttl = state.config.session.ttl_minutes;
    let token = session::persist(&state.db, prior, next, ttl).await?;
    let mut out = HeaderMap::new();
    if let Some(token) = token {
        out.insert(
            SET_COOKIE,
            session::session_cookie(token, ttl, state.config.session.cookie_secure)?,
        );
    }
    Ok((
        out,
        Json(SignupResponse {
            message: "Email verified! You are now logged in.".into(),
            user: PublicUser::from(&user),
        }),
    )
        .into_response())
}

#[instrument(skip(state, headers))]
pub async fn resend_code(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, IdentityError> {
    let ctx = match session::extract_session_token(&headers) {
        Some(token) => session::context_for(&state.db, token).await?,
        None => SessionContext::Anonymous,
    };

    // The hold stays under the same token; nothing to re-persist.
    services::resend_code(state.users.as_ref(), state.mailer.as_ref(), ctx).await?;
    Ok(Json(MessageResponse {
        message: "New verification code sent to your email.".into(),
    }))
}

#[instrument(skip(state, headers))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, IdentityError> {
    if let Some(token) = session::extract_session_token(&headers) {
        session::teardown(&state.db, token).await?;
    }
    let mut out = HeaderMap::new();
    out.insert(
        SET_COOKIE,
        session::clear_session_cookie(state.config.session.cookie_secure)?,
    );
    Ok((StatusCode::NO_CONTENT, out).into_response())
}

#[instrument(skip(state))]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response, IdentityError> {
    let Ok(provider) = provider.parse::<Provider>() else {
        return Ok((StatusCode::NOT_FOUND, "Unknown provider").into_response());
    };
    let Some(config) = provider_config(&state.config, provider) else {
        return Ok((StatusCode::NOT_FOUND, "Provider not configured").into_response());
    };

    let oauth_state = Uuid::new_v4().to_string();
    let url = providers::authorize_url(
        provider,
        config,
        &callback_uri(&state.config, provider),
        &oauth_state,
    );

    let mut out = HeaderMap::new();
    out.insert(
        SET_COOKIE,
        session::build_cookie(
            OAUTH_STATE_COOKIE,
            &oauth_state,
            600,
            state.config.session.cookie_secure,
        )?,
    );
    Ok((out, Redirect::temporary(&url)).into_response())
}

#[instrument(skip(state, params, headers))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, IdentityError> {
    let Ok(provider) = provider.parse::<Provider>() else {
        return Ok((StatusCode::NOT_FOUND, "Unknown provider").into_response());
    };
    let Some(config) = provider_config(&state.config, provider) else {
        return Ok((StatusCode::NOT_FOUND, "Provider not configured").into_response());
    };

    // The state cookie is one-shot; retire it on every exit path.
    let secure = state.config.session.cookie_secure;
    let mut out = HeaderMap::new();
    out.insert(
        SET_COOKIE,
        session::build_cookie(OAUTH_STATE_COOKIE, "", 0, secure)?,
    );

    if let Some(error) = params.error {
        warn!(provider = %provider, error = %error, "provider denied authorization");
        return Ok((out, Redirect::to("/login")).into_response());
    }
    let (Some(code), Some(echoed_state)) = (params.code, params.state) else {
        warn!(provider = %provider, "callback missing code or state");
        return Ok((out, Redirect::to("/login")).into_response());
    };
    let expected = session::extract_cookie(&headers, OAUTH_STATE_COOKIE);
    if expected.as_deref() != Some(echoed_state.as_str()) {
        warn!(provider = %provider, "oauth state mismatch");
        return Ok((StatusCode::BAD_REQUEST, out, "Invalid OAuth state").into_response());
    }

    let profile = match state
        .oauth
        .fetch_profile(
            provider,
            config,
            &code,
            &callback_uri(&state.config, provider),
            &echoed_state,
        )
        .await
    {
        Ok(profile) => profile,
        Err(e) => {
            warn!(provider = %provider, error = %e, "profile exchange failed");
            return Ok((out, Redirect::to("/login")).into_response());
        }
    };

    let user = match services::login_federated(state.users.as_ref(), provider, &profile).await {
        Ok(user) => user,
        Err(e @ (IdentityError::StoreUnavailable(_) | IdentityError::Internal(_))) => {
            return Err(e);
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "federated reconciliation failed");
            return Ok((out, Redirect::to("/login")).into_response());
        }
    };

    let prior = session::extract_session_token(&headers);
    let ttl = state.config.session.ttl_minutes;
    let token = session::persist(
        &state.db,
        prior,
        SessionContext::Bound { user_id: user.id },
        ttl,
    )
    .await?;
    if let Some(token) = token {
        out.append(SET_COOKIE, session::session_cookie(token, ttl, secure)?);
    }
    Ok((out, Redirect::to("/")).into_response())
}

#[instrument(skip_all)]
pub async fn me(SessionUser(user): SessionUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{COOKIE, LOCATION};

    #[tokio::test]
    async fn oauth_start_rejects_unknown_provider() {
        let state = AppState::fake();
        let resp = oauth_start(State(state), Path("facebook".into()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oauth_start_rejects_unconfigured_provider() {
        let state = AppState::fake();
        let resp = oauth_start(State(state), Path("google".into()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oauth_start_redirects_with_state_cookie() {
        let state = AppState::fake();
        let resp = oauth_start(State(state), Path("github".into()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);

        let location = resp.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert!(location.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(location.contains("client_id=test-client"));
        assert!(location.contains("state="));

        let cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(OAUTH_STATE_COOKIE));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn oauth_callback_rejects_state_mismatch() {
        let state = AppState::fake();
        let params = CallbackParams {
            code: Some("authcode".into()),
            state: Some("echoed".into()),
            error: None,
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            format!("{OAUTH_STATE_COOKIE}=something-else").parse().unwrap(),
        );
        let resp = oauth_callback(
            State(state),
            Path("github".into()),
            Query(params),
            headers,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oauth_callback_redirects_to_login_on_provider_denial() {
        let state = AppState::fake();
        let params = CallbackParams {
            code: None,
            state: None,
            error: Some("access_denied".into()),
        };
        let resp = oauth_callback(
            State(state),
            Path("github".into()),
            Query(params),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(location, "/login");
        // The one-shot state cookie is retired on the failure path too.
        let cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn logout_without_session_still_clears_the_cookie() {
        let state = AppState::fake();
        let resp = logout(State(state), HeaderMap::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }
}
