pub mod api_middleware;
pub mod auth;
pub mod limits;
pub mod security;
pub mod validation;

pub use api_middleware::{
    api_rate_limit_middleware, extract_client_id, logging_middleware,
    security_headers_middleware,
};
pub use auth::{AuthUser, admin_only, require_auth, users_only};
pub use limits::{LoginLimiter, RateLimitDecision, TokenBucketLimiter};
pub use security::{Claims, JwtService};
