//! Bearer-token middleware chain: `require_auth` validates the token and
//! stores the [`Claims`] in request extensions, `users_only` and
//! `admin_only` gate on them, and [`AuthUser`] hands them to handlers.

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use app_error::AppError;

use crate::security::jwt::{Claims, JwtService};

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// `Authorization` header (with or without `Bearer `), then `?token=`.
pub fn extract_token(req: &Request<Body>) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty())
        .map(String::from);

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(query)| query.token)
            .filter(|token| !token.is_empty())
    })
}

pub async fn require_auth(
    State(jwt_service): State<Arc<JwtService>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&req).ok_or_else(|| {
        debug!(path = %req.uri().path(), "Request without token");
        AppError::missing_token()
    })?;

    let claims = jwt_service.validate_token(&token)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

pub async fn users_only(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    if req.extensions().get::<Claims>().is_none() {
        warn!(path = %req.uri().path(), "Users-only route reached without claims");
        return Err(AppError::users_only());
    }
    Ok(next.run(req).await)
}

pub async fn admin_only(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Claims>() {
        Some(claims) if claims.admin => Ok(next.run(req).await),
        Some(claims) => {
            warn!(user = %claims.sub, path = %req.uri().path(), "Non-admin denied");
            Err(AppError::admins_only())
        }
        None => Err(AppError::admins_only()),
    }
}

/// Claims of the authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    pub fn is_admin(&self) -> bool {
        self.0.admin
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(AppError::missing_token)
    }
}
