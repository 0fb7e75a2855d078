//! Configuration module for accounting-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct AccountingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl AccountingConfig {
    /// Shared settings come from `configuration` / `APP__*`; the database and
    /// service name from plain environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "accounting-service".to_string()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_or("DATABASE_MIN_CONNECTIONS", 2),
            },
        })
    }

    pub fn log_level(&self) -> &str {
        &self.common.log_level
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.common.otlp_endpoint.as_deref()
    }
}

fn parse_or(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn database_url_is_required() {
        env::remove_var("DATABASE_URL");
        let err = AccountingConfig::from_env().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    #[serial]
    fn pool_sizes_fall_back_to_defaults() {
        env::set_var("DATABASE_URL", "postgres://localhost/accounting_test");
        env::set_var("DATABASE_MAX_CONNECTIONS", "not-a-number");
        env::remove_var("DATABASE_MIN_CONNECTIONS");

        let config = AccountingConfig::from_env().unwrap();
        assert_eq!(config.database.url, "postgres://localhost/accounting_test");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.min_connections, 2);

        env::remove_var("DATABASE_URL");
        env::remove_var("DATABASE_MAX_CONNECTIONS");
    }
}
