use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Tag {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Movie joined with every tag attached to it.
#[derive(Debug, Clone)]
pub struct MovieWithTags {
    pub movie: Movie,
    pub tags: Vec<Tag>,
}

/// Insert payload; `tags` are already trimmed and de-duplicated names.
#[derive(Debug, Clone)]
pub struct NewMovie {
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}
