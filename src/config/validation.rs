//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool size > 0)
//! - Validate addresses and the database URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.bind_address '{0}' is not a valid socket address")]
    BindAddress(String),

    #[error("database.url is not a valid URL: {0}")]
    DatabaseUrl(String),

    #[error("database.url has no host")]
    DatabaseHost,

    #[error("database.pool_size must be greater than zero")]
    PoolSize,

    #[error("database.connect_timeout_secs must be greater than zero")]
    ConnectTimeout,

    #[error("server.request_timeout_secs must be greater than zero")]
    RequestTimeout,

    #[error("shutdown.grace_period_ms must be greater than zero")]
    GracePeriod,

    #[error("observability.metrics_address '{0}' is not a valid socket address")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.server.bind_address.clone(),
        ));
    }

    match Url::parse(&config.database.url) {
        Ok(url) => {
            if url.host_str().is_none() {
                errors.push(ValidationError::DatabaseHost);
            }
        }
        Err(e) => errors.push(ValidationError::DatabaseUrl(e.to_string())),
    }

    if config.database.pool_size == 0 {
        errors.push(ValidationError::PoolSize);
    }

    if config.database.connect_timeout_secs == 0 {
        errors.push(ValidationError::ConnectTimeout);
    }

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::RequestTimeout);
    }

    if config.shutdown.grace_period_ms == 0 {
        errors.push(ValidationError::GracePeriod);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Render a list of validation errors as a single line.
pub fn render_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut config = AppConfig::default();
        config.server.bind_address = "not-an-address".into();
        config.database.url = "::nope::".into();
        config.database.pool_size = 0;
        config.shutdown.grace_period_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::PoolSize));
        assert!(errors.contains(&ValidationError::GracePeriod));
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::MetricsAddress("bogus".into())]
        );
    }
}
