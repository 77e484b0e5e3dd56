use anyhow::{bail, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_minutes: i64,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub google_client_id: String,
    pub github_client_id: String,
    pub github_client_secret: String,
    pub github_callback_url: String,
    /// Scheme of the mobile app deep link, e.g. `netflixclone://auth`.
    pub app_scheme: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub oauth: OAuthConfig,
    pub featured_movie_ids: Vec<i32>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let session = SessionConfig {
            cookie_name: std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "sid".into()),
            ttl_minutes: parse_ttl_minutes(std::env::var("SESSION_TTL_MINUTES").ok().as_deref())?,
            secure_cookie: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };
        let oauth = OAuthConfig {
            google_client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            github_client_id: std::env::var("GITHUB_CLIENT_ID").unwrap_or_default(),
            github_client_secret: std::env::var("GITHUB_CLIENT_SECRET").unwrap_or_default(),
            github_callback_url: std::env::var("GITHUB_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:8080/auth/github/callback".into()),
            app_scheme: std::env::var("APP_SCHEME").unwrap_or_else(|_| "netflixclone".into()),
        };
        let featured_movie_ids = match std::env::var("FEATURED_MOVIE_IDS") {
            Ok(raw) => parse_id_list(&raw),
            Err(_) => vec![1, 2, 3, 4],
        };
        Ok(Self {
            database_url,
            session,
            oauth,
            featured_movie_ids,
        })
    }
}

const DEFAULT_SESSION_TTL_MINUTES: i64 = 60 * 24 * 7;
const MAX_SESSION_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Session lifetime in minutes; unset means one week, and anything outside
/// one minute to one year is a startup error.
pub fn parse_ttl_minutes(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_SESSION_TTL_MINUTES);
    };
    let minutes: i64 = raw
        .parse()
        .with_context(|| format!("SESSION_TTL_MINUTES is not a number: {raw}"))?;
    if !(1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) {
        bail!("SESSION_TTL_MINUTES must be between 1 and {MAX_SESSION_TTL_MINUTES}, got {minutes}");
    }
    Ok(minutes)
}

/// Parses `"1, 2abc,x,3"` into `[1, 2, 3]`. Each entry contributes its leading
/// integer; entries without one are dropped.
pub fn parse_id_list(raw: &str) -> Vec<i32> {
    raw.split(',').filter_map(leading_int).collect()
}

fn leading_int(part: &str) -> Option<i32> {
    let part = part.trim();
    let sign = usize::from(part.starts_with(['+', '-']));
    let end = part[sign..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(part.len(), |i| i + sign);
    part[..end].parse().ok()
}
