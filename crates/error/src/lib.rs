pub mod middleware_handling;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    ConfigError(anyhow::Error),
    DatabaseError(anyhow::Error),
    ServerError(anyhow::Error),
    ValidationError(String),
    NotFoundError(String),
    AuthenticationError(String),
    AuthorizationError(String),
    RateLimitError(String),
    InputError(String),
    NetworkError(String),
    ResourceExistsError(String),
}

impl AppError {
    // User-friendly authentication errors
    pub fn invalid_credentials() -> Self {
        Self::AuthenticationError("Invalid email or password".to_string())
    }

    pub fn account_locked(seconds: u64) -> Self {
        Self::RateLimitError(format!(
            "Too many failed login attempts. Please try again in {} seconds.",
            seconds
        ))
    }

    pub fn missing_token() -> Self {
        Self::AuthenticationError("Missing token".to_string())
    }

    pub fn token_invalid() -> Self {
        Self::AuthenticationError("Invalid or expired token".to_string())
    }

    pub fn users_only() -> Self {
        Self::AuthorizationError("Access denied: Users only".to_string())
    }

    pub fn admins_only() -> Self {
        Self::AuthorizationError("Access denied: Admins only".to_string())
    }

    // Resource errors
    pub fn resource_not_found(resource_type: &str, identifier: &str) -> Self {
        Self::NotFoundError(format!(
            "{} with identifier '{}' was not found.",
            resource_type, identifier
        ))
    }

    pub fn resource_exists(resource_type: &str, identifier: &str) -> Self {
        Self::ResourceExistsError(format!(
            "{} with identifier '{}' already exists.",
            resource_type, identifier
        ))
    }

    // Validation errors
    pub fn validation(field: &str, message: &str) -> Self {
        Self::ValidationError(format!("Validation failed for '{}': {}", field, message))
    }

    /// HTTP status, client-facing message, machine code and help text for this error.
    fn parts(&self) -> (StatusCode, &str, &'static str, Option<&'static str>) {
        match self {
            Self::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "System configuration error",
                "CONFIG_ERROR",
                None,
            ),
            Self::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database operation failed",
                "DB_ERROR",
                None,
            ),
            Self::ServerError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "SERVER_ERROR",
                None,
            ),
            Self::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                msg.as_str(),
                "VALIDATION_ERROR",
                Some("Please review your input and try again."),
            ),
            Self::InputError(msg) => (
                StatusCode::BAD_REQUEST,
                msg.as_str(),
                "INPUT_ERROR",
                Some("The request could not be parsed."),
            ),
            Self::NotFoundError(msg) => (
                StatusCode::NOT_FOUND,
                msg.as_str(),
                "NOT_FOUND",
                Some("The requested resource was not found."),
            ),
            Self::AuthenticationError(msg) => (
                StatusCode::UNAUTHORIZED,
                msg.as_str(),
                "AUTH_ERROR",
                Some("Please log in to access this resource."),
            ),
            Self::AuthorizationError(msg) => (
                StatusCode::FORBIDDEN,
                msg.as_str(),
                "FORBIDDEN",
                Some("You don't have permission to access this resource."),
            ),
            Self::RateLimitError(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                msg.as_str(),
                "RATE_LIMIT",
                Some("Please try again later."),
            ),
            Self::ResourceExistsError(msg) => (
                StatusCode::CONFLICT,
                msg.as_str(),
                "CONFLICT",
                None,
            ),
            Self::NetworkError(_) => (
                StatusCode::BAD_GATEWAY,
                "An upstream service failed",
                "UPSTREAM_ERROR",
                Some("Please try again later."),
            ),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl std::error::Error for AppError {}

// Convert from various error types to AppError
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::ServerError(error)
    }
}

// Human-friendly error messages
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Self::DatabaseError(e) => write!(f, "Database error: {}", e),
            Self::ServerError(e) => write!(f, "Server error: {}", e),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::NotFoundError(msg) => write!(f, "Not found: {}", msg),
            Self::AuthenticationError(msg) => write!(f, "Authentication error: {}", msg),
            Self::AuthorizationError(msg) => write!(f, "Authorization error: {}", msg),
            Self::RateLimitError(msg) => write!(f, "Rate limit error: {}", msg),
            Self::InputError(msg) => write!(f, "Input error: {}", msg),
            Self::NetworkError(msg) => write!(f, "Network error: {}", msg),
            Self::ResourceExistsError(msg) => write!(f, "Resource exists: {}", msg),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code, help_text) = self.parts();

        let log_message = format!("[{}] {}: {}", error_code, status, self);
        if status.is_server_error() {
            tracing::error!(error_code = error_code, status_code = %status.as_u16(), %error_message, "{}", log_message);
        } else {
            tracing::warn!(error_code = error_code, status_code = %status.as_u16(), %error_message, "{}", log_message);
        }

        let body = Json(ErrorResponse {
            status: status.to_string(),
            message: error_message.to_string(),
            code: error_code.to_string(),
            // Don't expose internal error details to clients
            details: if status.is_server_error() {
                None
            } else {
                Some(self.to_string())
            },
            help: help_text.map(String::from),
        });

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

// Extension trait to wrap foreign errors with specific context
pub trait AppErrorExt<T> {
    fn config_err(self) -> AppResult<T>;
    fn db_err(self) -> AppResult<T>;
    fn server_err(self) -> AppResult<T>;
}

impl<T, E> AppErrorExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn config_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::ConfigError(e.into()))
    }

    fn db_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::DatabaseError(e.into()))
    }

    fn server_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::ServerError(e.into()))
    }
}
