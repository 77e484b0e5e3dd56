use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    auth::{
        oauth::ProviderIdentity,
        repo::SessionStore,
        repo_types::{NewUser, Provider, Session, User},
        session::new_session,
    },
    state::AppState,
};

pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Resolves the local account for an external identity.
///
/// Accounts are matched by email. A first login creates a subscribed account; an
/// existing account gets the provider id attached unless it already has one.
pub async fn sign_in_with_identity(
    state: &AppState,
    identity: &ProviderIdentity,
) -> anyhow::Result<User> {
    let email = match &identity.email {
        Some(email) => normalize_email(email),
        None if identity.provider == Provider::GitHub => {
            format!("{}@github.user", identity.subject)
        }
        None => bail!("{} identity carries no email", identity.provider),
    };

    if let Some(user) = state.users.find_by_email(&email).await? {
        return link_if_missing(state, user, identity).await;
    }

    let new = NewUser {
        email: email.clone(),
        name: identity.name.clone(),
        password_hash: None,
        provider: Some((identity.provider, identity.subject.clone())),
        subscribed: true,
    };
    match state.users.create(new).await? {
        Some(user) => {
            info!(user_id = user.id, provider = %identity.provider, "user created on first login");
            Ok(user)
        }
        None => {
            // concurrent sign-up won the insert
            let user = state
                .users
                .find_by_email(&email)
                .await?
                .ok_or_else(|| anyhow!("user {email} missing after insert conflict"))?;
            link_if_missing(state, user, identity).await
        }
    }
}

async fn link_if_missing(
    state: &AppState,
    user: User,
    identity: &ProviderIdentity,
) -> anyhow::Result<User> {
    if user.provider_id(identity.provider).is_some() {
        return Ok(user);
    }
    info!(user_id = user.id, provider = %identity.provider, "linking provider to existing user");
    state
        .users
        .link_provider(user.id, identity.provider, &identity.subject)
        .await
}

pub async fn open_session(state: &AppState, user_id: i32) -> anyhow::Result<Session> {
    let session = new_session(user_id, &state.config.session);
    state.sessions.insert(&session).await?;
    debug!(user_id, "session opened");
    Ok(session)
}

/// Deletes expired sessions every `every` until the task is aborted.
pub fn spawn_session_sweeper(sessions: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sessions.delete_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired sessions deleted"),
                Err(e) => warn!(error = ?e, "session sweep failed"),
            }
        }
    })
}
