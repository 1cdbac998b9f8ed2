use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{info, warn};

use app_error::{AppError, AppResult};
use app_middleware::{AuthUser, validation};
use app_models::{MessageResponse, NewReview, Review, ReviewUpdate};

use super::JsonBody;
use crate::{service::record_activity, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ReviewFilter {
    pub movie_id: Option<String>,
}

/// Loads a review the caller may change: its author or an admin.
async fn owned_review(state: &AppState, user: &AuthUser, id: &str) -> AppResult<Review> {
    let review = state
        .store
        .get_review(id)
        .await?
        .ok_or_else(|| AppError::resource_not_found("Review", id))?;

    if review.user_id != user.id() && !user.is_admin() {
        warn!(user = %user.id(), review = %id, "Review change denied");
        return Err(AppError::AuthorizationError(
            "You can only modify your own reviews".to_string(),
        ));
    }

    Ok(review)
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(filter): Query<ReviewFilter>,
) -> AppResult<Json<Vec<Review>>> {
    let movie_id = filter.movie_id.as_deref().filter(|id| !id.is_empty());
    Ok(Json(state.store.list_reviews(movie_id).await?))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Review>> {
    state
        .store
        .get_review(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::resource_not_found("Review", &id))
}

pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<NewReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    validation::validate_review(&input.content)?;

    if state.store.get_movie(&input.movie_id).await?.is_none() {
        return Err(AppError::resource_not_found("Movie", &input.movie_id));
    }

    let review = Review::new(
        input.content.trim().to_string(),
        user.id().to_string(),
        input.movie_id,
    );
    state.store.create_review(&review).await?;
    info!(review = %review.id, movie = %review.movie_id, "Review created");

    record_activity(
        state.store.as_ref(),
        Some(review.user_id.clone()),
        "review",
        format!("Reviewed movie {}", review.movie_id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<ReviewUpdate>,
) -> AppResult<Json<Review>> {
    owned_review(&state, &user, &id).await?;
    validation::validate_review(&input.content)?;

    state
        .store
        .update_review(&id, input.content.trim())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::resource_not_found("Review", &id))
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    owned_review(&state, &user, &id).await?;

    if !state.store.delete_review(&id).await? {
        return Err(AppError::resource_not_found("Review", &id));
    }
    info!(review = %id, user = %user.id(), "Review deleted");

    Ok(Json(MessageResponse::new("Review deleted successfully")))
}
