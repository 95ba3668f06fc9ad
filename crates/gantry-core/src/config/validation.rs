//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_version(config)?;
    validate_build(config)?;
    validate_signing(config)?;
    validate_publish(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_version(config: &Config) -> Result<()> {
    if let Some(version) = &config.version {
        semver::Version::parse(version).map_err(|e| ConfigError::InvalidValue {
            field: "version".to_string(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

fn validate_build(config: &Config) -> Result<()> {
    if config.build.command.iter().any(|arg| arg.is_empty()) {
        return Err(ConfigError::InvalidValue {
            field: "build.command".to_string(),
            message: "arguments cannot be empty".to_string(),
        }
        .into());
    }

    for pattern in &config.build.artifacts {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "build.artifacts".to_string(),
                message: "patterns cannot be empty".to_string(),
            }
            .into());
        }
    }

    Ok(())
}

fn validate_signing(config: &Config) -> Result<()> {
    if config.signing.keychain_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "signing.keychain_timeout_secs".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_publish(config: &Config) -> Result<()> {
    for (field, url) in [
        ("publish.api_url", &config.publish.api_url),
        ("publish.uploads_url", &config.publish.uploads_url),
    ] {
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "must be an http(s) URL".to_string(),
            }
            .into());
        }
    }
    Ok(())
}
