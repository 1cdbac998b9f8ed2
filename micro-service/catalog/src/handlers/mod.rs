pub mod auth;
pub mod chat;
pub mod checkout;
pub mod dashboard;
pub mod movies;
pub mod pages;
pub mod reviews;
pub mod system;
pub mod users;

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, de::DeserializeOwned};

use app_error::{AppError, AppResult};

/// `Json<T>` whose malformed bodies answer with the JSON error shape.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            // Left to the error middleware, which knows the 413 shape.
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(rejection.into_response())
            }
            Err(rejection) => Err(invalid_json(rejection).into_response()),
        }
    }
}

fn invalid_json(rejection: JsonRejection) -> AppError {
    AppError::InputError(format!("Invalid JSON format: {}", rejection.body_text()))
}

#[derive(Debug, Deserialize)]
pub struct ChatIdQuery {
    pub chat_id: Option<String>,
}

impl ChatIdQuery {
    pub fn require(self) -> AppResult<String> {
        self.chat_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::InputError("Missing chat_id".to_string()))
    }
}
