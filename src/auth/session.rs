use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    auth::repo_types::Session, config::SessionConfig, error::ApiError, state::AppState,
};

const SESSION_ID_LEN: usize = 48;

pub fn new_session_id() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

pub fn new_session(user_id: i32, cfg: &SessionConfig) -> Session {
    Session {
        id: new_session_id(),
        user_id,
        expires_at: OffsetDateTime::now_utc() + time::Duration::minutes(cfg.ttl_minutes),
    }
}

pub fn session_cookie(cfg: &SessionConfig, session_id: String) -> Cookie<'static> {
    Cookie::build((cfg.cookie_name.clone(), session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cfg.secure_cookie)
        .max_age(time::Duration::minutes(cfg.ttl_minutes))
        .build()
}

pub fn removal_cookie(cfg: &SessionConfig) -> Cookie<'static> {
    Cookie::build((cfg.cookie_name.clone(), "")).path("/").build()
}

/// Authenticated caller, resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i32,
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = jar
            .get(&state.config.session.cookie_name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                debug!("missing session cookie");
                ApiError::unauthorized("Unauthorized")
            })?;

        match state.sessions.find_user_id(&session_id).await? {
            Some(user_id) => Ok(SessionUser { user_id }),
            None => {
                debug!("unknown or expired session");
                Err(ApiError::unauthorized("Unauthorized"))
            }
        }
    }
}
