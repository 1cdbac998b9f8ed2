use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Instant,
};
use tracing::{error, info, trace, warn};

use app_error::AppError;

use crate::limits::token_bucket::{RateLimitDecision, TokenBucketLimiter};

// Extract client identifier from request
pub fn extract_client_id(req: &Request<Body>) -> String {
    if let Some(key) = req
        .headers()
        .get("X-API-Key")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        return key.to_string();
    }

    get_client_ip(req)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// Get client IP from proxy headers or connection info
pub fn get_client_ip(req: &Request<Body>) -> Option<IpAddr> {
    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|ip| IpAddr::from_str(ip.trim()).ok());
    if forwarded.is_some() {
        return forwarded;
    }

    let real_ip = req
        .headers()
        .get("X-Real-IP")
        .and_then(|value| value.to_str().ok())
        .and_then(|ip| IpAddr::from_str(ip.trim()).ok());
    if real_ip.is_some() {
        return real_ip;
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

pub fn add_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();

    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));

    if !decision.allowed {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after));
    }
}

/// Takes one token from the caller's bucket; an empty bucket answers 429.
pub async fn api_rate_limit_middleware(
    State(limiter): State<Arc<TokenBucketLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let client_id = extract_client_id(&req);
    let decision = limiter.try_acquire(&client_id).await;

    let mut response = if decision.allowed {
        trace!(client = %client_id, remaining = decision.remaining, "Rate limit check passed");
        next.run(req).await
    } else {
        warn!(
            client = %client_id,
            path = %req.uri().path(),
            retry_after = decision.retry_after,
            "Rate limit exceeded"
        );
        AppError::RateLimitError(format!(
            "Too many requests. Please try again in {} seconds.",
            decision.retry_after
        ))
        .into_response()
    };

    add_rate_limit_headers(&mut response, &decision);
    response
}

pub async fn security_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

// Logging middleware with performance tracking
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let client_id = extract_client_id(&req);

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16();

    if status < 400 {
        info!(
            method = %method,
            path = %path,
            client = %client_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    } else if status < 500 {
        warn!(
            method = %method,
            path = %path,
            client = %client_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        error!(
            method = %method,
            path = %path,
            client = %client_id,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    }

    response
}
