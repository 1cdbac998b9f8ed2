use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use app_error::{AppError, AppResult};
use app_models::{MessageResponse, UserProfile};

use crate::state::AppState;

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserProfile>>> {
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserProfile>> {
    state
        .store
        .get_user(&id)
        .await?
        .map(|user| Json(UserProfile::from(user)))
        .ok_or_else(|| AppError::resource_not_found("User", &id))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    if !state.store.delete_user(&id).await? {
        return Err(AppError::resource_not_found("User", &id));
    }
    info!(user = %id, "User deleted");

    Ok(Json(MessageResponse::new("User deleted successfully")))
}
