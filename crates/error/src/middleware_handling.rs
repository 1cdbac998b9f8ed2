use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::ErrorResponse;

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false)
}

/// Rewrites framework-generated error responses (body limit, timeouts, panics)
/// into the same JSON shape `AppError` produces. Responses that are already
/// JSON pass through untouched.
pub async fn error_handling_middleware(req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;
    let status = response.status();

    if is_json(&response) {
        return response;
    }

    let (message, code, help) = match status {
        StatusCode::PAYLOAD_TOO_LARGE => (
            "The request body exceeds the maximum allowed size",
            "PAYLOAD_TOO_LARGE",
            Some("Please reduce the size of your request and try again"),
        ),
        StatusCode::REQUEST_TIMEOUT => (
            "The request took too long to process",
            "TIMEOUT",
            Some("Please try again later"),
        ),
        status if status.is_server_error() => (
            "An internal server error occurred",
            "SERVER_ERROR",
            Some("Please try again later or contact support if the issue persists"),
        ),
        _ => return response,
    };

    error!(status = %status.as_u16(), code, "Rewriting non-JSON error response");

    let body = ErrorResponse {
        status: status.to_string(),
        message: message.to_string(),
        code: code.to_string(),
        details: None,
        help: help.map(String::from),
    };

    (status, Json(body)).into_response()
}
