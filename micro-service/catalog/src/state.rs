use std::sync::Arc;

use app_config::AppConfig;
use app_database::Store;
use app_middleware::{JwtService, TokenBucketLimiter};
use app_utils::Mailer;

use crate::chat::ChatHub;
use crate::service::AuthService;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub jwt_service: Arc<JwtService>,
    pub auth: Arc<AuthService>,
    pub api_limiter: Arc<TokenBucketLimiter>,
    pub chat: Arc<ChatHub>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        let jwt_service = Arc::new(JwtService::from_config(&config.security.jwt));
        let auth = Arc::new(AuthService::new(
            &config,
            Arc::clone(&store),
            Arc::clone(&jwt_service),
            mailer,
        ));
        let api_limiter = Arc::new(TokenBucketLimiter::from_settings(
            &config.security.rate_limiting.api,
        ));

        Self {
            config: Arc::new(config),
            store,
            jwt_service,
            auth,
            api_limiter,
            chat: Arc::new(ChatHub::new()),
        }
    }
}
