use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{NewUser, Provider, Session, User};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, google_id, github_id, subscribed, created_at";

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i32) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Inserts the user; returns `None` when the email is already registered.
    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>>;
    /// Sets the provider id unless one is already attached.
    async fn link_provider(
        &self,
        user_id: i32,
        provider: Provider,
        provider_id: &str,
    ) -> anyhow::Result<User>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> anyhow::Result<()>;
    /// Returns the owner of an unexpired session.
    async fn find_user_id(&self, session_id: &str) -> anyhow::Result<Option<i32>>;
    async fn delete(&self, session_id: &str) -> anyhow::Result<()>;
    /// Removes every expired session; returns how many were removed.
    async fn delete_expired(&self) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i32) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let (google_id, github_id) = match new.provider {
            Some((Provider::Google, id)) => (Some(id), None),
            Some((Provider::GitHub, id)) => (None, Some(id)),
            None => (None, None),
        };
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, google_id, github_id, subscribed)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(google_id)
        .bind(github_id)
        .bind(new.subscribed)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn link_provider(
        &self,
        user_id: i32,
        provider: Provider,
        provider_id: &str,
    ) -> anyhow::Result<User> {
        let column = match provider {
            Provider::Google => "google_id",
            Provider::GitHub => "github_id",
        };
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET {column} = COALESCE({column}, $2) WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(provider_id)
        .fetch_one(&self.db)
        .await
        .with_context(|| format!("link {provider} id to user {user_id}"))?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(&self.db)
        .await
        .context("insert session")?;
        Ok(())
    }

    async fn find_user_id(&self, session_id: &str) -> anyhow::Result<Option<i32>> {
        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            SELECT user_id
              FROM sessions
             WHERE id = $1 AND expires_at > now()
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.db)
        .await
        .context("find session")?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn delete(&self, session_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .context("delete session")?;
        Ok(())
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.db)
            .await
            .context("delete expired sessions")?;
        Ok(result.rows_affected())
    }
}
