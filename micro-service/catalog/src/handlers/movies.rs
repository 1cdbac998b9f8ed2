use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use app_database::MovieQuery;
use app_error::{AppError, AppResult};
use app_middleware::validation;
use app_models::{MessageResponse, Movie, MoviePatch, NewMovie};

use super::JsonBody;
use crate::state::AppState;

/// Body of `GET /movies`.
#[derive(Debug, Serialize)]
pub struct MoviePage {
    pub movies: Vec<Movie>,
    pub total: u64,
    pub total_pages: u64,
    pub page: u64,
    pub limit: u64,
    pub filters: Value,
    pub status: &'static str,
}

/// Body of `GET /search`.
#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub movies: Vec<Movie>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<MoviePage>> {
    let query = MovieQuery::from_pairs(&pairs)?;
    let (movies, total) = state.store.find_movies(&query).await?;

    Ok(Json(MoviePage {
        movies,
        total,
        total_pages: query.pagination.total_pages(total),
        page: query.pagination.page,
        limit: query.pagination.limit,
        filters: query.filters(),
        status: query.status(),
    }))
}

pub async fn search_movies(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<SearchPage>> {
    let query = MovieQuery::from_pairs(&pairs)?;
    let (movies, total) = state.store.find_movies(&query).await?;

    Ok(Json(SearchPage {
        movies,
        page: query.pagination.page,
        limit: query.pagination.limit,
        total,
    }))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Movie>> {
    state
        .store
        .get_movie(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::resource_not_found("Movie", &id))
}

pub async fn create_movie(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewMovie>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    validation::validate_movie(&input)?;

    let movie = Movie::new(input);
    state.store.create_movie(&movie).await?;
    info!(movie = %movie.id, title = %movie.title, "Movie created");

    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<MoviePatch>,
) -> AppResult<Json<Movie>> {
    validation::validate_movie_patch(&patch)?;

    let movie = state
        .store
        .update_movie(&id, patch)
        .await?
        .ok_or_else(|| AppError::resource_not_found("Movie", &id))?;
    info!(movie = %movie.id, "Movie updated");

    Ok(Json(movie))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    if !state.store.delete_movie(&id).await? {
        return Err(AppError::resource_not_found("Movie", &id));
    }
    info!(movie = %id, "Movie deleted");

    Ok(Json(MessageResponse::new("Movie deleted successfully")))
}
