pub mod login_limiter;
pub mod token_bucket;

pub use login_limiter::{LoginLimitConfig, LoginLimiter};
pub use token_bucket::{RateLimitDecision, TokenBucketLimiter};
