use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::error;

use app_error::AppError;

use crate::state::AppState;

async fn serve_page(state: &AppState, page: &str, req: Request<Body>) -> Response {
    let path = PathBuf::from(&state.config.server.static_dir).join(page);
    match ServeFile::new(path).oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!(page, "Failed to serve page: {}", e);
            AppError::ServerError(anyhow::anyhow!("Failed to serve {}", page)).into_response()
        }
    }
}

pub async fn index_page(State(state): State<AppState>, req: Request<Body>) -> Response {
    serve_page(&state, "index.html", req).await
}

pub async fn admin_page(State(state): State<AppState>, req: Request<Body>) -> Response {
    serve_page(&state, "admin.html", req).await
}

pub async fn login_page(State(state): State<AppState>, req: Request<Body>) -> Response {
    serve_page(&state, "login.html", req).await
}

pub async fn signup_page(State(state): State<AppState>, req: Request<Body>) -> Response {
    serve_page(&state, "signup.html", req).await
}
