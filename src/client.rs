//! HTTP client for the catalog API, used by the app shell to keep a session
//! and browse movies.

use std::{sync::Arc, time::Duration};

use reqwest::{
    cookie::{CookieStore, Jar},
    Client, Response, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::{
    auth::dto::{AuthResponse, MessageResponse, PublicUser},
    movies::{
        dto::{MovieResponse, MoviesQuery, StreamResponse},
        repo_types::Tag,
    },
};

const DEFAULT_COOKIE_NAME: &str = "sid";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Session-aware API client. The session cookie lives in a shared jar, so
/// clones of the client act as the same signed-in user.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    jar: Arc<Jar>,
    base: Url,
    cookie_name: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let mut base =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .user_agent(concat!("cinegate/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(jar.clone())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            jar,
            base,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        })
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Current session id held in the jar, e.g. to persist it across restarts.
    pub fn session_id(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base)?;
        let prefix = format!("{}=", self.cookie_name);
        header
            .to_str()
            .ok()?
            .split("; ")
            .find_map(|pair| pair.strip_prefix(&prefix))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Puts a previously issued session id (e.g. from the GitHub deep link) into the jar.
    pub fn restore_session(&self, session_id: &str) {
        let cookie = format!("{}={}; Path=/", self.cookie_name, session_id);
        self.jar.add_cookie_str(&cookie, &self.base);
    }

    // auth

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> ClientResult<AuthResponse> {
        let body = json!({ "email": email, "password": password, "name": name });
        self.post("auth/register", &body).await
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<AuthResponse> {
        let body = json!({ "email": email, "password": password });
        self.post("auth/login", &body).await
    }

    #[instrument(skip_all)]
    pub async fn google_login(&self, id_token: &str) -> ClientResult<AuthResponse> {
        self.post("auth/google", &json!({ "idToken": id_token })).await
    }

    pub async fn logout(&self) -> ClientResult<MessageResponse> {
        self.post("auth/logout", &json!({})).await
    }

    pub async fn me(&self) -> ClientResult<PublicUser> {
        self.get("me", None::<&()>).await
    }

    // catalog

    pub async fn tags(&self) -> ClientResult<Vec<Tag>> {
        self.get("tags", None::<&()>).await
    }

    #[instrument(skip(self))]
    pub async fn movies(&self, query: &MoviesQuery) -> ClientResult<Vec<MovieResponse>> {
        self.get("movies", Some(query)).await
    }

    /// Like [`ApiClient::movies`] but any failure yields an empty list.
    pub async fn movies_or_empty(&self, query: &MoviesQuery) -> Vec<MovieResponse> {
        match self.movies(query).await {
            Ok(movies) => movies,
            Err(e) => {
                warn!(error = %e, "failed to fetch movies");
                Vec::new()
            }
        }
    }

    pub async fn featured(&self) -> ClientResult<Vec<MovieResponse>> {
        self.get("movies/featured", None::<&()>).await
    }

    pub async fn movie(&self, id: i32) -> ClientResult<MovieResponse> {
        self.get(&format!("movies/{id}"), None::<&()>).await
    }

    pub async fn stream(&self, movie_id: i32) -> ClientResult<StreamResponse> {
        self.get(&format!("stream/{movie_id}"), None::<&()>).await
    }

    async fn get<Q, T>(&self, path: &str, query: Option<&Q>) -> ClientResult<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.http.get(self.url(path)?);
        if let Some(query) = query {
            req = req.query(query);
        }
        decode(req.send().await?).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.http.post(self.url(path)?).json(body).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let message = resp
        .json::<MessageResponse>()
        .await
        .map(|m| m.message)
        .unwrap_or_else(|_| fallback_message(status));
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

fn fallback_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
