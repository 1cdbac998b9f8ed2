use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use app_error::{AppError, AppResult};
use app_models::StatusResponse;

use super::JsonBody;

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /post`: accepts any object carrying a non-empty string `message`.
pub async fn echo_post(JsonBody(input): JsonBody<Value>) -> AppResult<Json<StatusResponse>> {
    let message = input
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .ok_or_else(|| AppError::InputError("Invalid JSON message".to_string()))?;

    info!(message, action = "post_request", "POST request received");
    Ok(Json(StatusResponse::success("Data successfully received")))
}

pub async fn echo_get() -> Json<StatusResponse> {
    info!(action = "get_request", "GET request received");
    Json(StatusResponse::success("GET request received"))
}
