use anyhow::bail;
use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, GitHubCallbackQuery, GoogleLoginRequest, LoginRequest, MessageResponse,
            PublicUser, RegisterRequest,
        },
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
        repo_types::{NewUser, Session},
        services::{is_valid_email, normalize_email, open_session, sign_in_with_identity},
        session::{removal_cookie, session_cookie, SessionUser},
    },
    error::{ApiError, ApiResult},
    state::AppState,
};

pub(crate) const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_PATH: &str = "/auth/github";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google", post(google_login))
        .route("/auth/github", get(github_start))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn with_session(state: &AppState, jar: CookieJar, session: Session) -> CookieJar {
    jar.add(session_cookie(&state.config.session, session.id))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password required"));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::bad_request("User already exists"));
    }

    let password_hash = hash_password(&payload.password)?;
    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let user = state
        .users
        .create(NewUser {
            email: email.clone(),
            name,
            password_hash: Some(password_hash),
            provider: None,
            subscribed: true,
        })
        .await?
        .ok_or_else(|| {
            warn!(%email, "email registered concurrently");
            ApiError::bad_request("User already exists")
        })?;

    let session = open_session(&state, user.id).await?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        with_session(&state, jar, session),
        Json(AuthResponse::new("User registered", user.subscribed)),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    let email = normalize_email(&payload.email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(ApiError::unauthorized("Invalid credentials"));
    };

    if !verify_password(&payload.password, user.password_hash.as_deref())? {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let session = open_session(&state, user.id).await?;
    info!(user_id = user.id, "user logged in");
    Ok((
        with_session(&state, jar, session),
        Json(AuthResponse::new("Login successful", user.subscribed)),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn google_login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<GoogleLoginRequest>, ApiError>,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    let Some(id_token) = payload.id_token.filter(|t| !t.is_empty()) else {
        return Err(ApiError::bad_request("ID Token missing"));
    };

    let identity = match state.identity.verify_google_id_token(&id_token).await {
        Ok(identity) if identity.email.is_some() => identity,
        Ok(_) => {
            warn!("google token without email");
            return Err(ApiError::unauthorized("Invalid Google Token"));
        }
        Err(e) => {
            warn!(error = %e, "google token rejected");
            return Err(ApiError::unauthorized("Invalid Google Token"));
        }
    };

    let user = sign_in_with_identity(&state, &identity).await?;
    let session = open_session(&state, user.id).await?;
    info!(user_id = user.id, "google login");
    Ok((
        with_session(&state, jar, session),
        Json(AuthResponse::new("Google login successful", user.subscribed)),
    ))
}

#[instrument(skip(state, jar))]
pub async fn github_start(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Redirect)> {
    let nonce = Uuid::new_v4().to_string();
    let url = state.identity.github_authorize_url(&nonce)?;
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, nonce))
        .path(OAUTH_STATE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.session.secure_cookie)
        .max_age(time::Duration::minutes(10))
        .build();
    Ok((jar.add(cookie), Redirect::to(&url)))
}

/// Finishes the GitHub flow and hands the session to the app through its deep link.
#[instrument(skip(state, jar, query))]
pub async fn github_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GitHubCallbackQuery>,
) -> (CookieJar, Redirect) {
    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build((OAUTH_STATE_COOKIE, "")).path(OAUTH_STATE_PATH).build());
    let scheme = state.config.oauth.app_scheme.clone();

    match complete_github_login(&state, query, expected_state).await {
        Ok(session) => {
            let link = deep_link(&scheme, Some(&session.id));
            (with_session(&state, jar, session), Redirect::to(&link))
        }
        Err(e) => {
            warn!(error = %e, "github login failed");
            (jar, Redirect::to(&deep_link(&scheme, None)))
        }
    }
}

async fn complete_github_login(
    state: &AppState,
    query: GitHubCallbackQuery,
    expected_state: Option<String>,
) -> anyhow::Result<Session> {
    if let Some(err) = query.error {
        bail!("github returned error: {err}");
    }
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        bail!("callback is missing code or state");
    };
    if expected_state.as_deref() != Some(returned_state.as_str()) {
        bail!("oauth state mismatch");
    }

    let identity = state.identity.exchange_github_code(&code).await?;
    let user = sign_in_with_identity(state, &identity).await?;
    info!(user_id = user.id, "github login");
    open_session(state, user.id).await
}

pub(crate) fn deep_link(scheme: &str, session_id: Option<&str>) -> String {
    match session_id {
        Some(id) => format!("{scheme}://auth?success=true&session={id}"),
        None => format!("{scheme}://auth?success=false"),
    }
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    let session_id = jar
        .get(&state.config.session.cookie_name)
        .map(|c| c.value().to_string());
    if let Some(session_id) = session_id {
        state.sessions.delete(&session_id).await?;
        info!("session closed");
    }
    Ok((
        jar.remove(removal_cookie(&state.config.session)),
        Json(MessageResponse {
            message: "Logged out".into(),
        }),
    ))
}

#[instrument(skip(state, auth), fields(user_id = auth.user_id))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: SessionUser,
) -> ApiResult<Json<PublicUser>> {
    let user = state
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    Ok(Json(PublicUser {
        id: user.id,
        name: user.name,
        email: user.email,
        subscribed: user.subscribed,
    }))
}
