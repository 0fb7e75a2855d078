use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Observability settings shared by every binary in the workspace.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        load()
    }
}

/// Load a settings tree from an optional `configuration` file overlaid with
/// `APP__`-prefixed environment variables (`APP__DATABASE__URL` -> `database.url`).
pub fn load<T: DeserializeOwned>() -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        unsafe {
            std::env::remove_var("APP__LOG_LEVEL");
            std::env::remove_var("APP__OTLP_ENDPOINT");
        }

        let config = Config::load().expect("config should load");
        assert_eq!(config.log_level, "info");
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        unsafe {
            std::env::set_var("APP__LOG_LEVEL", "debug");
        }

        let config = Config::load().expect("config should load");
        assert_eq!(config.log_level, "debug");

        unsafe {
            std::env::remove_var("APP__LOG_LEVEL");
        }
    }
}
