use app_config::LoginLimitSettings;
use app_error::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Failed logins recorded for one account
#[derive(Debug, Clone)]
struct FailureEntry {
    failures: usize,
    first_failure: Instant,
    last_failure: Instant,
}

#[derive(Debug, Clone)]
pub struct LoginLimitConfig {
    pub max_attempts: usize,
    pub window_duration: Duration,
    pub block_duration: Option<Duration>,
}

impl Default for LoginLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_duration: Duration::from_secs(300), // 5 minutes
            block_duration: Some(Duration::from_secs(900)), // 15 minutes
        }
    }
}

impl From<&LoginLimitSettings> for LoginLimitConfig {
    fn from(settings: &LoginLimitSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window_duration: Duration::from_secs(settings.window_duration),
            block_duration: settings.block_duration.map(Duration::from_secs),
        }
    }
}

/// Locks an account out after `max_attempts` failed logins inside
/// `window_duration`. The lock lasts `block_duration` from the last failure,
/// or until the window ends when no block duration is set.
#[derive(Debug, Clone)]
pub struct LoginLimiter {
    failures: Arc<RwLock<HashMap<String, FailureEntry>>>,
    config: LoginLimitConfig,
    cleanup_interval: Duration,
    last_cleanup: Arc<RwLock<Instant>>,
}

impl LoginLimiter {
    pub fn new(config: LoginLimitConfig) -> Self {
        Self {
            failures: Arc::new(RwLock::new(HashMap::new())),
            config,
            cleanup_interval: Duration::from_secs(300), // 5 minutes
            last_cleanup: Arc::new(RwLock::new(Instant::now())),
        }
    }

    pub fn from_settings(settings: &LoginLimitSettings) -> Self {
        Self::new(LoginLimitConfig::from(settings))
    }

    /// Fails with a rate limit error while the account is locked.
    pub async fn check(&self, identifier: &str) -> AppResult<()> {
        self.check_at(identifier, Instant::now()).await
    }

    pub async fn record_failure(&self, identifier: &str) {
        self.record_failure_at(identifier, Instant::now()).await
    }

    /// A successful login clears the account's failure history.
    pub async fn record_success(&self, identifier: &str) {
        self.failures.write().await.remove(identifier);
    }

    pub(crate) async fn check_at(&self, identifier: &str, now: Instant) -> AppResult<()> {
        let mut failures = self.failures.write().await;
        self.cleanup(&mut failures, now).await;

        let Some(entry) = failures.get(identifier) else {
            return Ok(());
        };

        if entry.failures < self.config.max_attempts {
            return Ok(());
        }

        let remaining = match self.config.block_duration {
            Some(block) => block.checked_sub(now.saturating_duration_since(entry.last_failure)),
            None => self
                .config
                .window_duration
                .checked_sub(now.saturating_duration_since(entry.first_failure)),
        };

        match remaining {
            Some(left) if !left.is_zero() => {
                tracing::warn!(account = %identifier, seconds = left.as_secs(), "Login blocked");
                Err(AppError::account_locked(left.as_secs().max(1)))
            }
            _ => {
                // Lock expired; start over.
                failures.remove(identifier);
                Ok(())
            }
        }
    }

    pub(crate) async fn record_failure_at(&self, identifier: &str, now: Instant) {
        let mut failures = self.failures.write().await;

        match failures.get_mut(identifier) {
            Some(entry)
                if now.saturating_duration_since(entry.first_failure)
                    < self.config.window_duration =>
            {
                entry.failures += 1;
                entry.last_failure = now;
            }
            _ => {
                failures.insert(
                    identifier.to_string(),
                    FailureEntry {
                        failures: 1,
                        first_failure: now,
                        last_failure: now,
                    },
                );
            }
        }
    }

    /// Clean up old entries
    async fn cleanup(&self, failures: &mut HashMap<String, FailureEntry>, now: Instant) {
        let mut last_cleanup = self.last_cleanup.write().await;

        if now.saturating_duration_since(*last_cleanup) >= self.cleanup_interval {
            failures.retain(|_, entry| {
                let in_window =
                    now.saturating_duration_since(entry.first_failure) < self.config.window_duration;
                let in_block = self
                    .config
                    .block_duration
                    .map(|d| {
                        entry.failures >= self.config.max_attempts
                            && now.saturating_duration_since(entry.last_failure) < d
                    })
                    .unwrap_or(false);

                in_window || in_block
            });

            *last_cleanup = now;
        }
    }
}
