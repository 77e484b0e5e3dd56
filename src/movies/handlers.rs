use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::session::SessionUser,
    error::{ApiError, ApiResult},
    movies::{
        dto::{CreateMovieRequest, CreatedMovieResponse, MovieResponse, MoviesQuery, StreamResponse},
        filter::MovieFilter,
        repo_types::{NewMovie, Tag},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/featured", get(featured_movies))
        .route("/movies/:id", get(get_movie))
        .route("/stream/:movie_id", get(stream_url))
}

/// Movie id from the path. A segment that is not an id names no movie.
#[derive(Debug, Clone, Copy)]
pub struct MovieId(pub i32);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MovieId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::not_found("Movie not found"))?;
        raw.parse().map(MovieId).map_err(|_| {
            debug!(%raw, "non-numeric movie id");
            ApiError::not_found("Movie not found")
        })
    }
}

#[instrument(skip(state, _auth))]
pub async fn list_tags(
    State(state): State<AppState>,
    _auth: SessionUser,
) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(state.catalog.list_tags().await?))
}

#[instrument(skip(state, _auth))]
pub async fn list_movies(
    State(state): State<AppState>,
    _auth: SessionUser,
    Query(query): Query<MoviesQuery>,
) -> ApiResult<Json<Vec<MovieResponse>>> {
    let filter = MovieFilter::from_query(&query);
    debug!(?filter, "listing movies");
    let movies = state.catalog.list_movies(&filter).await?;
    info!(count = movies.len(), "movies found");
    Ok(Json(movies.into_iter().map(MovieResponse::from).collect()))
}

#[instrument(skip(state, _auth))]
pub async fn featured_movies(
    State(state): State<AppState>,
    _auth: SessionUser,
) -> ApiResult<Json<Vec<MovieResponse>>> {
    let movies = state
        .catalog
        .movies_by_ids(&state.config.featured_movie_ids)
        .await?;
    Ok(Json(movies.into_iter().map(MovieResponse::from).collect()))
}

#[instrument(skip(state, _auth))]
pub async fn get_movie(
    State(state): State<AppState>,
    _auth: SessionUser,
    MovieId(id): MovieId,
) -> ApiResult<Json<MovieResponse>> {
    let movie = state
        .catalog
        .find_movie(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Movie not found"))?;
    Ok(Json(movie.into()))
}

#[instrument(skip(state, auth), fields(user_id = auth.user_id))]
pub async fn stream_url(
    State(state): State<AppState>,
    auth: SessionUser,
    MovieId(movie_id): MovieId,
) -> ApiResult<Json<StreamResponse>> {
    let Some(found) = state.catalog.find_movie(movie_id).await? else {
        warn!(movie_id, "stream for unknown movie");
        return Err(ApiError::not_found("Movie not found"));
    };
    let movie = found.movie;
    if movie.video_url.trim().is_empty() {
        warn!(movie_id, "movie has no video url");
        return Err(ApiError::not_found("Video not available"));
    }

    info!(movie_id, "stream url issued");
    Ok(Json(StreamResponse {
        video_url: movie.video_url,
        movie_id: movie.id,
        title: movie.title,
    }))
}

#[instrument(skip(state, _auth, payload))]
pub async fn create_movie(
    State(state): State<AppState>,
    _auth: SessionUser,
    WithRejection(Json(payload), _): WithRejection<Json<CreateMovieRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<CreatedMovieResponse>)> {
    let new = validate_new_movie(payload)?;
    let movie = state.catalog.insert_movie(new).await?;
    info!(movie_id = movie.movie.id, tags = movie.tags.len(), "movie added");
    Ok((
        StatusCode::CREATED,
        Json(CreatedMovieResponse {
            message: "Movie added".into(),
            movie: movie.into(),
        }),
    ))
}

fn validate_new_movie(payload: CreateMovieRequest) -> ApiResult<NewMovie> {
    let required = |v: Option<String>, field: &str| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
    };
    let optional = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    Ok(NewMovie {
        title: required(payload.title, "title")?,
        video_url: required(payload.video_url, "video_url")?,
        description: optional(payload.description),
        thumbnail_url: optional(payload.thumbnail_url),
        category: optional(payload.category),
        tags: clean_tag_names(payload.tags),
    })
}

/// Trims names, drops empties and keeps the first occurrence of duplicates.
fn clean_tag_names(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}
