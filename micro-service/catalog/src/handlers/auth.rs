use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use app_error::AppResult;
use app_middleware::AuthUser;
use app_models::{LoginInput, LoginResponse, MessageResponse, SignupInput, UserProfile};

use super::JsonBody;
use crate::state::AppState;

const SESSION_COOKIE: &str = "userToken";

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
}

pub async fn signup(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<SignupInput>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let user = state.auth.signup(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created. Please check your email for verification.".to_string(),
            user,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> AppResult<Json<LoginResponse>> {
    state.auth.login(input).await.map(Json)
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .verify_email(query.token.as_deref().unwrap_or_default())
        .await?;

    Ok(Json(MessageResponse::new(
        "Email verified successfully. You can now log in.",
    )))
}

/// Expires the browser's session cookie and sends it to the login page.
pub async fn logout(user: AuthUser) -> impl IntoResponse {
    info!(user = %user.id(), "User logged out");

    let expired = format!(
        "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict",
        SESSION_COOKIE
    );
    ([(header::SET_COOKIE, expired)], Redirect::to("/login.html"))
}
