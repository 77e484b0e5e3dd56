use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::movies::repo_types::{MovieWithTags, Tag};

/// Query string of `GET /movies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoviesQuery {
    /// Legacy single tag name, e.g. `tag=Action`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Comma-separated tag ids, e.g. `tags=1,2,3`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl MoviesQuery {
    pub fn with_tag_ids(ids: &[i32]) -> Self {
        let joined = ids.iter().map(i32::to_string).collect::<Vec<_>>().join(",");
        Self {
            tags: Some(joined),
            ..Self::default()
        }
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieResponse {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "Tags")]
    pub tags: Vec<Tag>,
}

impl From<MovieWithTags> for MovieResponse {
    fn from(m: MovieWithTags) -> Self {
        Self {
            id: m.movie.id,
            title: m.movie.title,
            description: m.movie.description,
            video_url: m.movie.video_url,
            thumbnail_url: m.movie.thumbnail_url,
            category: m.movie.category,
            created_at: m.movie.created_at,
            tags: m.tags,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub video_url: String,
    pub movie_id: i32,
    pub title: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateMovieRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedMovieResponse {
    pub message: String,
    pub movie: MovieResponse,
}
