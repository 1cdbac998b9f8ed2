use sentry::ClientInitGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use app_config::MonitoringConfig;
use app_error::{AppErrorExt, AppResult};

/// `RUST_LOG` when set, otherwise the configured level with noisy
/// dependencies turned down.
fn build_env_filter(level: &str) -> AppResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = [
        level.to_string(),
        "hyper=warn".to_string(),
        "surrealdb=warn".to_string(),
        "tower_http=info".to_string(),
    ]
    .join(",");
    EnvFilter::try_new(&directives).config_err()
}

fn init_sentry(monitoring: &MonitoringConfig) -> Option<ClientInitGuard> {
    let sentry_config = &monitoring.sentry;
    if sentry_config.dsn.trim().is_empty() {
        return None;
    }

    Some(sentry::init((
        sentry_config.dsn.clone(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            sample_rate: sentry_config.sample_rate,
            traces_sample_rate: sentry_config.traces_sample_rate,
            environment: Some(sentry_config.environment.clone().into()),
            ..Default::default()
        },
    )))
}

/// Installs the global subscriber: JSON or human-readable output, plus the
/// Sentry layer when a DSN is configured. Keep the returned guard alive for
/// the life of the process.
pub fn init_tracing(monitoring: &MonitoringConfig) -> AppResult<Option<ClientInitGuard>> {
    let guard = init_sentry(monitoring);
    let filter = build_env_filter(&monitoring.logging.level)?;

    let fmt_layer = if monitoring.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };
    let sentry_layer = guard.as_ref().map(|_| sentry_tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(sentry_layer)
        .try_init()
        .server_err()?;

    Ok(guard)
}
