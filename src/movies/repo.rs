use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::movies::{
    filter::MovieFilter,
    repo_types::{Movie, MovieWithTags, NewMovie, Tag},
};

const MOVIE_COLUMNS: &str =
    "m.id, m.title, m.description, m.video_url, m.thumbnail_url, m.category, m.created_at";

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>>;
    /// Movies passing `filter`, ordered by id.
    async fn list_movies(&self, filter: &MovieFilter) -> anyhow::Result<Vec<MovieWithTags>>;
    /// Movies whose id is in `ids`, ordered by id; unknown ids are skipped.
    async fn movies_by_ids(&self, ids: &[i32]) -> anyhow::Result<Vec<MovieWithTags>>;
    async fn find_movie(&self, id: i32) -> anyhow::Result<Option<MovieWithTags>>;
    /// Inserts the movie, creating missing tags by name.
    async fn insert_movie(&self, new: NewMovie) -> anyhow::Result<MovieWithTags>;
}

#[derive(Clone)]
pub struct PgCatalogStore {
    db: PgPool,
}

impl PgCatalogStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn attach_tags(&self, movies: Vec<Movie>) -> anyhow::Result<Vec<MovieWithTags>> {
        if movies.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = movies.iter().map(|m| m.id).collect();
        let rows = sqlx::query_as::<_, (i32, i32, String)>(
            r#"
            SELECT mt.movie_id, t.id, t.name
              FROM movie_tags mt
              JOIN tags t ON t.id = mt.tag_id
             WHERE mt.movie_id = ANY($1)
             ORDER BY t.id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await
        .context("load movie tags")?;

        let mut by_movie: HashMap<i32, Vec<Tag>> = HashMap::new();
        for (movie_id, id, name) in rows {
            by_movie.entry(movie_id).or_default().push(Tag { id, name });
        }
        Ok(movies
            .into_iter()
            .map(|movie| {
                let tags = by_movie.remove(&movie.id).unwrap_or_default();
                MovieWithTags { movie, tags }
            })
            .collect())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list_tags(&self) -> anyhow::Result<Vec<Tag>> {
        sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY id ASC")
            .fetch_all(&self.db)
            .await
            .context("list tags")
    }

    async fn list_movies(&self, filter: &MovieFilter) -> anyhow::Result<Vec<MovieWithTags>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {MOVIE_COLUMNS} FROM movies m"));
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY m.id ASC");

        let movies = qb
            .build_query_as::<Movie>()
            .fetch_all(&self.db)
            .await
            .context("list movies")?;
        self.attach_tags(movies).await
    }

    async fn movies_by_ids(&self, ids: &[i32]) -> anyhow::Result<Vec<MovieWithTags>> {
        let movies = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies m WHERE m.id = ANY($1) ORDER BY m.id ASC"
        ))
        .bind(ids)
        .fetch_all(&self.db)
        .await
        .context("movies by ids")?;
        self.attach_tags(movies).await
    }

    async fn find_movie(&self, id: i32) -> anyhow::Result<Option<MovieWithTags>> {
        let movie = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies m WHERE m.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find movie")?;

        match movie {
            Some(movie) => Ok(self.attach_tags(vec![movie]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert_movie(&self, new: NewMovie) -> anyhow::Result<MovieWithTags> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let movie = sqlx::query_as::<_, Movie>(
            r#"
            INSERT INTO movies AS m (title, description, video_url, thumbnail_url, category)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING m.id, m.title, m.description, m.video_url, m.thumbnail_url, m.category, m.created_at
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.video_url)
        .bind(&new.thumbnail_url)
        .bind(&new.category)
        .fetch_one(&mut *tx)
        .await
        .context("insert movie")?;

        let mut tags = Vec::with_capacity(new.tags.len());
        for name in &new.tags {
            // no-op update so RETURNING yields the existing row too
            let tag = sqlx::query_as::<_, Tag>(
                r#"
                INSERT INTO tags (name) VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id, name
                "#,
            )
            .bind(name)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("upsert tag {name}"))?;

            sqlx::query(
                "INSERT INTO movie_tags (movie_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(movie.id)
            .bind(tag.id)
            .execute(&mut *tx)
            .await
            .context("link movie tag")?;
            tags.push(tag);
        }

        tx.commit().await.context("commit tx")?;
        tags.sort_by_key(|t| t.id);
        Ok(MovieWithTags { movie, tags })
    }
}
