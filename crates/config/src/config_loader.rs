use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, info, warn};

use app_error::{AppError, AppErrorExt, AppResult};

/// Environment variable naming the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "MOVIEVERSE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/app-config.json";

const DEFAULT_JWT_SECRET: &str = "default-insecure-jwt-secret-do-not-use-in-production";

/// Complete application configuration loaded from JSON file
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
    pub monitoring: MonitoringConfig,
    pub bootstrap_admin: Option<AdminSeedConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
    pub request_timeout_secs: u64,
    pub static_dir: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Surreal,
    Sqlite,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub surreal: SurrealDbConfig,
    pub sqlite: SqliteConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SurrealDbConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
}

impl SurrealDbConfig {
    pub fn is_memory(&self) -> bool {
        self.endpoint.starts_with("mem")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SqliteConfig {
    /// File path, or `:memory:` for a private in-memory database.
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub rate_limiting: RateLimitingConfig,
    pub password: PasswordConfig,
    pub require_verified_email: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_hours: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub api: TokenBucketSettings,
    pub login: LoginLimitSettings,
}

/// Token bucket: `burst` tokens of capacity refilled at `rate_per_second`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenBucketSettings {
    pub rate_per_second: f64,
    pub burst: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoginLimitSettings {
    pub max_attempts: usize,
    pub window_duration: u64,
    pub block_duration: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Log,
    Http,
    Smtp,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MailConfig {
    pub provider: MailProvider,
    pub endpoint: String,
    pub api_key: String,
    pub smtp: SmtpConfig,
    pub from: String,
    pub verification_base_url: String,
}

/// Relay settings for the `smtp` provider. Credentials are optional; an empty
/// username sends without AUTH.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub starttls: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitoringConfig {
    pub sentry: SentryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SentryConfig {
    pub dsn: String,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
    pub environment: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Admin account created at startup when no user with this email exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminSeedConfig {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load `.env`, the JSON config file and environment overrides, then validate.
    pub fn load() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            let conf = Self::from_file(&path).config_err()?;
            info!("Loaded {} configuration from {}", conf.environment, path);
            conf
        } else {
            warn!("Config file {} not found. Using default configuration.", path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `MOVIEVERSE_*` overrides from the given lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MOVIEVERSE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MOVIEVERSE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid MOVIEVERSE_PORT '{}'", port),
            }
        }
        if let Some(backend) = lookup("MOVIEVERSE_DB_BACKEND") {
            match backend.to_lowercase().as_str() {
                "surreal" => self.database.backend = StoreBackend::Surreal,
                "sqlite" => self.database.backend = StoreBackend::Sqlite,
                other => warn!("Ignoring unknown MOVIEVERSE_DB_BACKEND '{}'", other),
            }
        }
        if let Some(endpoint) = lookup("MOVIEVERSE_SURREAL_ENDPOINT") {
            self.database.surreal.endpoint = endpoint;
        }
        if let Some(path) = lookup("MOVIEVERSE_SQLITE_PATH") {
            self.database.sqlite.path = path;
        }
        if let Some(secret) = lookup("MOVIEVERSE_JWT_SECRET") {
            self.security.jwt.secret = secret;
        }
        if let Some(dsn) = lookup("MOVIEVERSE_SENTRY_DSN") {
            self.monitoring.sentry.dsn = dsn;
        }
        if let Some(password) = lookup("MOVIEVERSE_SMTP_PASSWORD") {
            self.mail.smtp.password = password;
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Validate the configuration
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        let is_production = self.is_production();

        if self.server.host.trim().is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }

        if self.server.port == 0 {
            errors.push("Server port cannot be 0".to_string());
        }

        if self.server.body_limit == 0 {
            errors.push("Server body limit must be greater than 0".to_string());
        }

        match self.database.backend {
            StoreBackend::Surreal => {
                self.validate_surreal_config(&self.database.surreal, is_production, &mut errors)
            }
            StoreBackend::Sqlite => {
                if self.database.sqlite.path.trim().is_empty() {
                    errors.push("SQLite path cannot be empty".to_string());
                }
            }
        }

        if self.security.jwt.secret.is_empty() {
            errors.push("JWT secret cannot be empty".to_string());
        } else if is_production
            && (self.security.jwt.secret.len() < 32 || self.security.jwt.secret == DEFAULT_JWT_SECRET)
        {
            errors.push("JWT secret is not secure for production use".to_string());
        }

        if self.security.jwt.expiry_hours == 0 {
            errors.push("JWT expiry must be at least one hour".to_string());
        }

        let api = &self.security.rate_limiting.api;
        if api.burst == 0 || api.rate_per_second <= 0.0 {
            errors.push("API rate limit needs a positive rate and burst".to_string());
        }

        if self.security.rate_limiting.login.max_attempts == 0 {
            errors.push("Login rate limit max_attempts must be greater than 0".to_string());
        }

        if self.mail.provider == MailProvider::Http {
            if self.mail.endpoint.trim().is_empty() {
                errors.push("Mail endpoint is required for the http provider".to_string());
            } else if is_production && !self.mail.endpoint.starts_with("https://") {
                errors.push("Production should use a secure 'https://' mail endpoint".to_string());
            }
        }

        if self.mail.provider == MailProvider::Smtp {
            let smtp = &self.mail.smtp;
            if smtp.host.trim().is_empty() {
                errors.push("SMTP host is required for the smtp provider".to_string());
            }
            if smtp.port == 0 {
                errors.push("SMTP port must be greater than 0".to_string());
            }
            if smtp.username.is_empty() != smtp.password.is_empty() {
                errors.push("SMTP username and password must be set together".to_string());
            }
            if is_production && !smtp.starttls {
                errors.push("Production should send mail over STARTTLS".to_string());
            }
            if is_production && smtp.username.is_empty() {
                errors.push("Production SMTP relay needs credentials".to_string());
            }
        }

        if let Some(admin) = &self.bootstrap_admin {
            if admin.email.trim().is_empty() || admin.password.is_empty() {
                errors.push("Bootstrap admin needs an email and a password".to_string());
            }
        }

        if !errors.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid configuration: {}",
                errors.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_surreal_config(
        &self,
        db_config: &SurrealDbConfig,
        is_production: bool,
        errors: &mut Vec<String>,
    ) {
        if db_config.endpoint.trim().is_empty() {
            errors.push("SurrealDB endpoint cannot be empty".to_string());
        } else if is_production
            && !db_config.endpoint.starts_with("wss://")
            && !db_config.is_memory()
        {
            errors.push(
                "SurrealDB should use a secure 'wss://' connection in production".to_string(),
            );
        }

        if db_config.namespace.trim().is_empty() {
            errors.push("SurrealDB namespace cannot be empty".to_string());
        }

        if db_config.database.trim().is_empty() {
            errors.push("SurrealDB database name cannot be empty".to_string());
        }

        if is_production {
            if db_config.username == "root" {
                errors.push("Using default 'root' SurrealDB username in production is insecure".to_string());
            }

            if db_config.password == "root" {
                errors.push("Using default 'root' SurrealDB password in production is insecure".to_string());
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            security: SecurityConfig::default(),
            mail: MailConfig::default(),
            monitoring: MonitoringConfig::default(),
            bootstrap_admin: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 1048576, // 1MB
            request_timeout_secs: 30,
            static_dir: "static".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Surreal,
            surreal: SurrealDbConfig::default(),
            sqlite: SqliteConfig::default(),
        }
    }
}

impl Default for SurrealDbConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000".to_string(),
            username: "root".to_string(),
            password: "root".to_string(),
            namespace: "movieverse".to_string(),
            database: "movieverse".to_string(),
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "movieverse.db".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            password: PasswordConfig::default(),
            require_verified_email: false,
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_JWT_SECRET.to_string(),
            expiry_hours: 24,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            api: TokenBucketSettings {
                rate_per_second: 1.0,
                burst: 5,
            },
            login: LoginLimitSettings {
                max_attempts: 5,
                window_duration: 300,
                block_duration: Some(900),
            },
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_number: true,
            require_special: false,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: MailProvider::Log,
            endpoint: String::new(),
            api_key: String::new(),
            smtp: SmtpConfig::default(),
            from: "no-reply@movieverse.local".to_string(),
            verification_base_url: "http://localhost:8080/verify-email".to_string(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            starttls: true,
            timeout_secs: 10,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sentry: SentryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            sample_rate: 1.0,
            traces_sample_rate: 0.2,
            environment: "development".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
