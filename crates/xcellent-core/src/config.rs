use crate::app_config::{AppConfig, Environment, SourceCredentials};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let env = parse_environment(&or_default("XCELLENT_ENV", "development"));

    let bind_addr = or_default("XCELLENT_BIND_ADDR", "0.0.0.0:3848")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("XCELLENT_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("XCELLENT_LOG_LEVEL", "info");
    let data_dir = PathBuf::from(or_default("XCELLENT_DATA_DIR", "./data"));
    let database_url = optional("DATABASE_URL");

    let db_max_connections = parse_u32("XCELLENT_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("XCELLENT_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("XCELLENT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let source = match (
        optional("X_BEARER_TOKEN"),
        optional("X_USER_ID"),
        optional("X_USERNAME"),
    ) {
        (Some(bearer_token), Some(user_id), Some(username)) => Some(SourceCredentials {
            bearer_token,
            user_id,
            username,
        }),
        _ => None,
    };
    let source_base_url = or_default("XCELLENT_SOURCE_BASE_URL", "https://api.x.com/2");
    let source_timeout_secs = parse_u64("XCELLENT_SOURCE_TIMEOUT_SECS", "8")?;

    let poll_interval_secs = parse_u64("XCELLENT_POLL_INTERVAL_SECS", "14400")?;
    if poll_interval_secs == 0 {
        return Err(invalid(
            "XCELLENT_POLL_INTERVAL_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let poll_startup_delay_secs = parse_u64("XCELLENT_POLL_STARTUP_DELAY_SECS", "300")?;
    let poll_max_items = parse_usize("XCELLENT_POLL_MAX_ITEMS", "200")?;
    let backfill_lookback_days = parse_u32("XCELLENT_BACKFILL_LOOKBACK_DAYS", "7")?;
    let retention_days = parse_u32("XCELLENT_RETENTION_DAYS", "365")?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        data_dir,
        database_url,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        source,
        source_base_url,
        source_timeout_secs,
        poll_interval_secs,
        poll_startup_delay_secs,
        poll_max_items,
        backfill_lookback_days,
        retention_days,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
