//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ceilings > 0, replay TTL beyond tolerance)
//! - Check route table consistency (unique names, webhook secret present)
//! - Check addresses and token digests parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{BridgeConfig, RouteKind, ADMIN_KEY_PLACEHOLDER};
use crate::security::rate_limit::LimiterClass;

const KNOWN_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if !(1..=5_000).contains(&config.timeouts.store_ms) {
        errors.push(ValidationError::new("timeouts.store_ms", "must be between 1 and 5000"));
    }
    if config.timeouts.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("timeouts.sweep_interval_secs", "must be greater than 0"));
    }

    validate_webhook(config, &mut errors);
    validate_rate_limits(config, &mut errors);
    validate_routes(config, &mut errors);
    validate_tokens(config, &mut errors);

    for proxy in &config.security.trusted_proxies {
        if proxy.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "security.trusted_proxies",
                format!("'{proxy}' is not an IP address"),
            ));
        }
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    if config.admin.enabled && (config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER) {
        errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_webhook(config: &BridgeConfig, errors: &mut Vec<ValidationError>) {
    let webhook = &config.webhook;
    let has_webhook_route = config.routes.0.iter().any(|r| r.kind == RouteKind::Webhook);

    if has_webhook_route && webhook.secret.is_empty() {
        errors.push(ValidationError::new(
            "webhook.secret",
            "required when a webhook route is configured",
        ));
    }
    if webhook.tolerance_secs == 0 {
        errors.push(ValidationError::new("webhook.tolerance_secs", "must be greater than 0"));
    }
    if webhook.replay_ttl_secs <= webhook.tolerance_secs {
        errors.push(ValidationError::new(
            "webhook.replay_ttl_secs",
            "must exceed webhook.tolerance_secs",
        ));
    }
    for (field, header) in [
        ("webhook.signature_header", &webhook.signature_header),
        ("webhook.timestamp_header", &webhook.timestamp_header),
    ] {
        if axum::http::HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, "must be a valid header name"));
        }
    }
}

fn validate_rate_limits(config: &BridgeConfig, errors: &mut Vec<ValidationError>) {
    for class in LimiterClass::ALL {
        let ceilings = config.rate_limit.classes.get(class);
        let field = format!("rate_limit.classes.{class}");
        if ceilings.per_minute == 0 || ceilings.per_hour == 0 {
            errors.push(ValidationError::new(&field, "ceilings must be greater than 0"));
        }
        if ceilings.per_hour < ceilings.per_minute {
            errors.push(ValidationError::new(&field, "per_hour must be at least per_minute"));
        }
    }
}

fn validate_routes(config: &BridgeConfig, errors: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();
    for route in &config.routes.0 {
        let field = format!("routes.{}", route.name);
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(&field, "duplicate route name"));
        }
        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(&field, "path must start with '/'"));
        }
        if let Some(method) = &route.method {
            let known = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .is_ok_and(|m| KNOWN_METHODS.contains(&m));
            if !known {
                errors.push(ValidationError::new(&field, format!("unknown method '{method}'")));
            }
        }
        if let RouteKind::Protected { ability: Some(ability), .. } = &route.kind {
            if ability.trim().is_empty() {
                errors.push(ValidationError::new(&field, "ability must not be empty"));
            }
        }
    }
}

fn validate_tokens(config: &BridgeConfig, errors: &mut Vec<ValidationError>) {
    let mut ids = HashSet::new();
    for token in &config.auth.tokens {
        let field = format!("auth.tokens.{}", token.id);
        if !ids.insert(token.id) {
            errors.push(ValidationError::new(&field, "duplicate token id"));
        }
        if token.token_sha256.len() != 64 || !token.token_sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            errors.push(ValidationError::new(&field, "token_sha256 must be 64 hex characters"));
        }
        if token.principal.is_empty() {
            errors.push(ValidationError::new(&field, "principal must not be empty"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Ceilings, RouteConfig, TokenConfig};

    fn valid() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.webhook.secret = "whsec".into();
        config
    }

    #[test]
    fn test_defaults_with_secret_are_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn test_missing_secret_rejected() {
        let errors = validate_config(&BridgeConfig::default()).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "webhook.secret"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.listener.bind_address = "nowhere".into();
        config.rate_limit.classes.ai = Ceilings::new(0, 10);
        config.rate_limit.classes.export = Ceilings::new(50, 10);
        config.security.trusted_proxies = vec!["proxy.local".into()];
        config.admin.enabled = true;
        config.routes.0.push(RouteConfig {
            name: "auth-login".into(),
            method: Some("FETCH".into()),
            path: "no-slash".into(),
            kind: RouteKind::Webhook,
            priority: 0,
        });
        config.auth.tokens.push(TokenConfig {
            id: 1,
            principal: String::new(),
            token_sha256: "abc".into(),
            abilities: vec![],
            expires_at: None,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        for expected in [
            "listener.bind_address",
            "rate_limit.classes.ai",
            "rate_limit.classes.export",
            "security.trusted_proxies",
            "admin.api_key",
            "routes.auth-login",
            "auth.tokens.1",
        ] {
            assert!(fields.contains(&expected), "missing {expected} in {fields:?}");
        }
    }

    #[test]
    fn test_ttl_must_exceed_tolerance() {
        let mut config = valid();
        config.webhook.replay_ttl_secs = 300;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "webhook.replay_ttl_secs");
    }
}
