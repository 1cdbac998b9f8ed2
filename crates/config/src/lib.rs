use app_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod config_loader;
pub use config_loader::*;

/// Configuration is read from a JSON file (see [`AppConfig::load`]) with a
/// handful of `MOVIEVERSE_*` environment overrides applied on top.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub port: u16,
    pub address: String,
    pub body_limit: usize,
    pub request_timeout: Duration,
}

impl Server {
    pub fn new(address: String, port: u16) -> Self {
        Self {
            port,
            address,
            body_limit: ServerConfig::default().body_limit,
            request_timeout: Duration::from_secs(ServerConfig::default().request_timeout_secs),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    // Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid server port: '0' is not a valid port number"
            )));
        }

        if self.address.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Server address cannot be empty"
            )));
        }

        Ok(())
    }
}

impl From<&AppConfig> for Server {
    fn from(config: &AppConfig) -> Self {
        Self {
            port: config.server.port,
            address: config.server.host.clone(),
            body_limit: config.server.body_limit,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_from_app_config() {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 3000;
        config.server.request_timeout_secs = 5;

        let server = Server::from(&config);
        assert_eq!(server.bind_address(), "127.0.0.1:3000");
        assert_eq!(server.request_timeout, Duration::from_secs(5));
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_server_rejects_port_zero() {
        assert!(Server::new("0.0.0.0".to_string(), 0).validate().is_err());
        assert!(Server::new(" ".to_string(), 80).validate().is_err());
    }
}
