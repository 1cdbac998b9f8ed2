use app_config::JwtConfig;
use app_error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub email: String,
    pub admin: bool,
    pub iat: i64, // Issued at
    pub exp: i64, // Expiration time
}

/// Issues and validates HS256 session tokens.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: u64,
}

impl JwtService {
    pub fn new(secret: &[u8], expiry_hours: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiry_hours,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.expiry_hours)
    }

    pub fn expiry_hours(&self) -> u64 {
        self.expiry_hours
    }

    pub fn generate_token(&self, user_id: &str, email: &str, admin: bool) -> AppResult<String> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.expiry_hours as i64);

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            admin,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            AppError::ServerError(anyhow::anyhow!("Failed to generate token: {}", e))
        })
    }

    /// Any signature, format or expiry problem maps to the same client error.
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| {
                warn!("Token validation failed: {}", e);
                AppError::token_invalid()
            })?;

        debug!("Token validated for user: {}", token_data.claims.sub);
        Ok(token_data.claims)
    }
}
