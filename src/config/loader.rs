//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{AppConfig, Environment};
use crate::config::validation::{render_errors, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", render_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// Load a configuration file, apply env overrides and validate the result.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: AppConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults and env overrides alone.
pub fn from_env() -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment variable overrides.
///
/// The deployment platform owns DATABASE_URL, APP_ENV and PORT; values from
/// the environment win over the file.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.is_empty() {
            config.database.url = url;
        }
    }

    if let Ok(env) = std::env::var("APP_ENV") {
        match env.as_str() {
            "development" => config.environment = Environment::Development,
            "production" => config.environment = Environment::Production,
            "test" => config.environment = Environment::Test,
            _ => {}
        }
    }

    if let Ok(port) = std::env::var("PORT") {
        if let Ok(port) = port.parse::<u16>() {
            if let Some((host, _)) = config.server.bind_address.rsplit_once(':') {
                config.server.bind_address = format!("{host}:{port}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_valid_file() {
        let path = write_temp_config(
            "habitd_loader_valid.toml",
            r#"
            environment = "production"

            [shutdown]
            grace_period_ms = 2500
            "#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.shutdown.grace_period_ms, 2500);

        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let path = write_temp_config(
            "habitd_loader_invalid.toml",
            r#"
            [database]
            pool_size = 0
            "#,
        );

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("pool_size"));

        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/habitd.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides_win_over_defaults() {
        std::env::set_var("DATABASE_URL", "postgres://rotated:cred@db:5432/habits");
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config);
        std::env::remove_var("DATABASE_URL");

        assert_eq!(config.database.url, "postgres://rotated:cred@db:5432/habits");
    }
}
