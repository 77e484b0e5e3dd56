use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    auth::{
        oauth::{HttpIdentityProvider, IdentityProvider},
        repo::{PgSessionStore, PgUserStore, SessionStore, UserStore},
    },
    config::AppConfig,
    movies::repo::{CatalogStore, PgCatalogStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Connects to PostgreSQL and wires the Postgres-backed stores.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(config);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let identity = Arc::new(HttpIdentityProvider::new(config.oauth.clone())?)
            as Arc<dyn IdentityProvider>;

        let state = Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            sessions: Arc::new(PgSessionStore::new(db.clone())),
            catalog: Arc::new(PgCatalogStore::new(db.clone())),
            identity,
            config,
        };
        Ok((state, db))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        catalog: Arc<dyn CatalogStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            users,
            sessions,
            catalog,
            identity,
        }
    }
}
