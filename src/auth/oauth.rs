//! Google ID-token verification and the GitHub authorization-code flow.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use reqwest::{header, Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::{auth::repo_types::Provider, config::OAuthConfig};

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("cinegate/", env!("CARGO_PKG_VERSION"));

/// Identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub provider: Provider,
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_google_id_token(&self, id_token: &str) -> anyhow::Result<ProviderIdentity>;
    fn github_authorize_url(&self, csrf_state: &str) -> anyhow::Result<String>;
    async fn exchange_github_code(&self, code: &str) -> anyhow::Result<ProviderIdentity>;
}

pub struct HttpIdentityProvider {
    http: Client,
    config: OAuthConfig,
}

impl HttpIdentityProvider {
    pub fn new(config: OAuthConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build oauth http client")?;
        Ok(Self { http, config })
    }

    async fn github_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        access_token: &str,
    ) -> anyhow::Result<T> {
        self.http
            .get(format!("{GITHUB_API_URL}{path}"))
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("github GET {path}"))?
            .error_for_status()
            .with_context(|| format!("github GET {path}"))?
            .json::<T>()
            .await
            .with_context(|| format!("parse github {path}"))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubToken {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify_google_id_token(&self, id_token: &str) -> anyhow::Result<ProviderIdentity> {
        if self.config.google_client_id.is_empty() {
            bail!("google sign-in is not configured");
        }
        let keys: JwkSet = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .context("fetch google jwks")?
            .error_for_status()
            .context("fetch google jwks")?
            .json()
            .await
            .context("parse google jwks")?;

        let jwk = select_jwk(&keys, id_token)?;
        let key = DecodingKey::from_jwk(jwk).context("google jwk to decoding key")?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.google_client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<GoogleClaims>(id_token, &key, &validation)
            .context("verify google id token")?
            .claims;
        if claims.email_verified == Some(false) {
            bail!("google email is not verified");
        }
        debug!(sub = %claims.sub, "google id token verified");
        Ok(ProviderIdentity {
            provider: Provider::Google,
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
        })
    }

    fn github_authorize_url(&self, csrf_state: &str) -> anyhow::Result<String> {
        github_authorize_url(&self.config, csrf_state).map(String::from)
    }

    async fn exchange_github_code(&self, code: &str) -> anyhow::Result<ProviderIdentity> {
        let token: GitHubToken = self
            .http
            .post(GITHUB_TOKEN_URL)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.github_client_id.as_str()),
                ("client_secret", self.config.github_client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.github_callback_url.as_str()),
            ])
            .send()
            .await
            .context("github token request")?
            .error_for_status()
            .context("github token request")?
            .json()
            .await
            .context("parse github token response")?;

        let access_token = match (token.access_token, token.error) {
            (Some(t), None) => t,
            (_, err) => bail!(
                "github rejected code: {} {}",
                err.unwrap_or_default(),
                token.error_description.unwrap_or_default()
            ),
        };

        let user: GitHubUser = self.github_get("/user", &access_token).await?;
        let email = match user.email {
            Some(email) => Some(email),
            None => {
                let emails: Vec<GitHubEmail> = self.github_get("/user/emails", &access_token).await?;
                pick_email(emails)
            }
        };
        debug!(github_id = user.id, login = %user.login, "github user fetched");
        Ok(ProviderIdentity {
            provider: Provider::GitHub,
            subject: user.id.to_string(),
            email,
            name: user.name.or(Some(user.login)),
        })
    }
}

pub fn github_authorize_url(cfg: &OAuthConfig, csrf_state: &str) -> anyhow::Result<Url> {
    if cfg.github_client_id.is_empty() {
        bail!("github sign-in is not configured");
    }
    let url = Url::parse_with_params(
        GITHUB_AUTHORIZE_URL,
        &[
            ("client_id", cfg.github_client_id.as_str()),
            ("redirect_uri", cfg.github_callback_url.as_str()),
            ("scope", "user:email"),
            ("state", csrf_state),
        ],
    )?;
    Ok(url)
}

/// Picks the signing key named by the token's `kid` header.
fn select_jwk<'a>(keys: &'a JwkSet, id_token: &str) -> anyhow::Result<&'a Jwk> {
    let header = decode_header(id_token).context("decode id token header")?;
    let kid = header.kid.ok_or_else(|| anyhow!("id token has no key id"))?;
    keys.find(&kid)
        .ok_or_else(|| anyhow!("no google signing key with kid {kid}"))
}

fn pick_email(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}
