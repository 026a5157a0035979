//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_WEBHOOK_SECRET: &str = "BRIDGE_WEBHOOK_SECRET";
pub const ENV_ADMIN_API_KEY: &str = "BRIDGE_ADMIN_API_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: BridgeConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Built-in defaults plus environment overrides, validated.
pub fn load_default_config() -> Result<BridgeConfig, ConfigError> {
    let mut config = BridgeConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Secrets may come from the environment instead of the file.
pub fn apply_env_overrides<F>(config: &mut BridgeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup(ENV_WEBHOOK_SECRET).filter(|s| !s.is_empty()) {
        config.webhook.secret = secret;
    }
    if let Some(key) = lookup(ENV_ADMIN_API_KEY).filter(|s| !s.is_empty()) {
        config.admin.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = BridgeConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            ENV_WEBHOOK_SECRET => Some("from-env".to_string()),
            ENV_ADMIN_API_KEY => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.webhook.secret, "from-env");
        assert_eq!(config.admin.api_key, crate::config::schema::ADMIN_KEY_PLACEHOLDER);
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("crm-bridge-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [webhook]
            secret = "whsec_file"
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_example_config_is_valid() {
        let mut config: BridgeConfig = toml::from_str(include_str!("../../bridge.example.toml")).unwrap();
        apply_env_overrides(&mut config, |_| None);
        validate_config(&config).unwrap();

        assert_eq!(config.routes.0.len(), 4);
        assert_eq!(config.auth.tokens[0].abilities, vec!["lgpd:*", "conversations:read"]);
        assert_eq!(config.rate_limit.classes.webhook.per_hour, 1000);
    }

    #[test]
    fn test_invalid_file_reports_validation_errors() {
        let path = std::env::temp_dir().join(format!("crm-bridge-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"
            [webhook]
            secret = "whsec_file"
            tolerance_secs = 600
            replay_ttl_secs = 300
            "#,
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("replay_ttl_secs"));

        fs::remove_file(&path).unwrap_or_default();
    }
}
