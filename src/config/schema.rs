//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::rate_limit::LimiterClass;

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Webhook signature and replay settings.
    pub webhook: WebhookConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Accepted API tokens.
    pub auth: AuthConfig,

    /// Route table. Replaces the built-in table when non-empty in a file.
    pub routes: Routes,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout in seconds.
    pub request_secs: u64,

    /// Deadline for a single shared-state backend call, in milliseconds.
    pub store_ms: u64,

    /// Interval between proactive eviction passes.
    pub sweep_interval_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            store_ms: 100,
            sweep_interval_secs: 60,
        }
    }
}

/// What to do when a shared-state backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    /// Let the request through and log a warning.
    Open,
    /// Reject the request with 503.
    Closed,
}

impl FailPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailPolicy::Open => "open",
            FailPolicy::Closed => "closed",
        }
    }
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared HMAC secret. Overridden by `BRIDGE_WEBHOOK_SECRET`.
    pub secret: String,

    /// Header carrying the hex HMAC.
    pub signature_header: String,

    /// Header carrying the signing timestamp.
    pub timestamp_header: String,

    /// Maximum allowed clock skew in seconds.
    pub tolerance_secs: u64,

    /// How long an accepted identifier blocks duplicates.
    pub replay_ttl_secs: u64,

    /// Policy when the replay store is unavailable.
    pub on_store_error: FailPolicy,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            signature_header: "x-signature".to_string(),
            timestamp_header: "x-timestamp".to_string(),
            tolerance_secs: 300,
            replay_ttl_secs: 600,
            on_store_error: FailPolicy::Closed,
        }
    }
}

/// Per-minute and per-hour request ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Ceilings {
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Ceilings {
    pub const fn new(per_minute: u32, per_hour: u32) -> Self {
        Self { per_minute, per_hour }
    }
}

/// Ceilings for every limiter class.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterClasses {
    pub login: Ceilings,
    pub refresh: Ceilings,
    pub api: Ceilings,
    pub ai: Ceilings,
    pub lgpd: Ceilings,
    pub export: Ceilings,
    pub webhook: Ceilings,
}

impl LimiterClasses {
    pub fn get(&self, class: LimiterClass) -> Ceilings {
        match class {
            LimiterClass::Login => self.login,
            LimiterClass::Refresh => self.refresh,
            LimiterClass::Api => self.api,
            LimiterClass::Ai => self.ai,
            LimiterClass::Lgpd => self.lgpd,
            LimiterClass::Export => self.export,
            LimiterClass::Webhook => self.webhook,
        }
    }
}

impl Default for LimiterClasses {
    fn default() -> Self {
        Self {
            login: Ceilings::new(5, 20),
            refresh: Ceilings::new(5, 20),
            api: Ceilings::new(60, 600),
            ai: Ceilings::new(30, 300),
            lgpd: Ceilings::new(5, 20),
            export: Ceilings::new(5, 20),
            webhook: Ceilings::new(100, 1000),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Policy when the bucket store is unavailable.
    pub on_backend_error: FailPolicy,

    /// Ceilings per limiter class.
    pub classes: LimiterClasses,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_backend_error: FailPolicy::Open,
            classes: LimiterClasses::default(),
        }
    }
}

/// Accepted API tokens.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

/// One accepted `<id>|<secret>` token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenConfig {
    /// Numeric token id (the part before `|`).
    pub id: u64,

    /// Principal the token authenticates.
    pub principal: String,

    /// Lowercase hex SHA-256 of the secret part.
    pub token_sha256: String,

    /// Granted abilities (`conversations:read`, `lgpd:*`, `*`).
    #[serde(default)]
    pub abilities: Vec<String>,

    /// Expiry as unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// How a route is protected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteKind {
    /// Signed webhook: rate limit by IP, HMAC, replay check.
    Webhook,
    /// Unauthenticated: rate limit by IP.
    Public { limiter: LimiterClass },
    /// Bearer token: authenticate, require ability, rate limit by principal.
    Protected {
        limiter: LimiterClass,
        #[serde(default)]
        ability: Option<String>,
    },
}

/// Route configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// HTTP method; any method when absent.
    #[serde(default)]
    pub method: Option<String>,

    /// Path prefix, matched on segment boundaries.
    pub path: String,

    #[serde(flatten)]
    pub kind: RouteKind,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Route table wrapper so a file's `[[routes]]` replaces the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Routes(pub Vec<RouteConfig>);

impl Default for Routes {
    fn default() -> Self {
        fn route(name: &str, method: &str, path: &str, kind: RouteKind) -> RouteConfig {
            RouteConfig {
                name: name.to_string(),
                method: Some(method.to_string()),
                path: path.to_string(),
                kind,
                priority: 0,
            }
        }
        fn protected(limiter: LimiterClass, ability: &str) -> RouteKind {
            RouteKind::Protected {
                limiter,
                ability: Some(ability.to_string()),
            }
        }

        Self(vec![
            route("chatwoot-webhook", "POST", "/api/webhooks/chatwoot", RouteKind::Webhook),
            route("auth-login", "POST", "/api/auth/login", RouteKind::Public { limiter: LimiterClass::Login }),
            route("auth-refresh", "POST", "/api/auth/refresh", RouteKind::Public { limiter: LimiterClass::Refresh }),
            route("conversations", "GET", "/api/conversations", protected(LimiterClass::Api, "conversations:read")),
            route("ai", "POST", "/api/ai", protected(LimiterClass::Ai, "ai:use")),
            route("consents-read", "GET", "/api/lgpd/consents", protected(LimiterClass::Lgpd, "lgpd:read")),
            route("consents-write", "POST", "/api/lgpd/consents", protected(LimiterClass::Lgpd, "lgpd:write")),
            route("lgpd-export", "POST", "/api/lgpd/export", protected(LimiterClass::Export, "lgpd:export")),
            RouteConfig {
                name: "admin".to_string(),
                method: None,
                path: "/api/admin".to_string(),
                kind: protected(LimiterClass::Api, "admin:write"),
                priority: 0,
            },
        ])
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security response headers.
    pub enable_headers: bool,

    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Peers whose `X-Forwarded-For` is trusted.
    pub trusted_proxies: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
            trusted_proxies: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin endpoints.
    pub enabled: bool,

    /// API key for authentication (Bearer token). Overridden by
    /// `BRIDGE_ADMIN_API_KEY`.
    pub api_key: String,
}

pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ceilings() {
        let classes = LimiterClasses::default();
        assert_eq!(classes.get(LimiterClass::Login), Ceilings::new(5, 20));
        assert_eq!(classes.get(LimiterClass::Api), Ceilings::new(60, 600));
        assert_eq!(classes.get(LimiterClass::Webhook), Ceilings::new(100, 1000));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [webhook]
            secret = "whsec"

            [rate_limit.classes.login]
            per_minute = 3
            per_hour = 10

            [[routes]]
            name = "hook"
            method = "POST"
            path = "/hooks"
            kind = "webhook"

            [[routes]]
            name = "consents"
            path = "/api/lgpd"
            kind = "protected"
            limiter = "lgpd"
            ability = "lgpd:write"
        "#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.webhook.secret, "whsec");
        assert_eq!(config.webhook.tolerance_secs, 300);
        assert_eq!(config.rate_limit.classes.login, Ceilings::new(3, 10));
        assert_eq!(config.rate_limit.classes.api, Ceilings::new(60, 600));
        assert_eq!(config.routes.0.len(), 2);
        assert_eq!(
            config.routes.0[1].kind,
            RouteKind::Protected {
                limiter: LimiterClass::Lgpd,
                ability: Some("lgpd:write".into())
            }
        );
    }

    #[test]
    fn test_defaults_include_every_route_kind() {
        let routes = Routes::default();
        assert!(routes.0.iter().any(|r| r.kind == RouteKind::Webhook));
        assert!(routes.0.iter().any(|r| matches!(r.kind, RouteKind::Public { .. })));
        assert!(routes.0.iter().any(|r| matches!(r.kind, RouteKind::Protected { .. })));
    }
}
