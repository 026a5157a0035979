//! Per-request security pipeline.
//!
//! # Responsibilities
//! - Run the checks a route class requires, in a fixed order
//! - Apply the fail policy when a shared-state backend misbehaves
//! - Produce exactly one [`Decision`] per request
//! - Log every rejection with caller context and redacted identity
//!
//! # Stage order
//! ```text
//! webhook:   Received → RateLimitChecked(ip) → AuthOrSignatureChecked(HMAC)
//!            → Validated → ReplayChecked → Dispatched
//! protected: Received → AuthOrSignatureChecked(token + ability)
//!            → RateLimitChecked(user) → Dispatched
//! public:    Received → RateLimitChecked(ip) → Dispatched
//! ```
//! Any stage may end the request with `Rejected`.
//!
//! # Design Decisions
//! - Webhook floods are shed before any HMAC work
//! - Protected routes authenticate first because the principal keys the bucket
//! - A request failing the signature never touches the replay store
//! - A webhook whose dispatch fails is released from the replay store

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method};
use serde::Serialize;
use serde_json::Value;

use crate::config::schema::{BridgeConfig, FailPolicy, RouteKind};
use crate::error::BridgeError;
use crate::observability::metrics;
use crate::pipeline::dispatch::{Dispatched, Dispatcher};
use crate::pipeline::validation;
use crate::routing::Route;
use crate::security::auth::{bearer_token, AuthGuard, Principal, StaticTokenVerifier};
use crate::security::rate_limit::{LimiterClass, MemoryRateLimitStore, RateDecision, RateLimiter};
use crate::security::redact;
use crate::security::replay::{event_identifier, MemoryReplayStore, ReplayOutcome, ReplayStore, StoreError};
use crate::security::signature::{HeaderNames, SignatureVerifier, SignedWebhookEnvelope};
use crate::time::Clock;

/// Position of a request in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    AuthOrSignatureChecked,
    RateLimitChecked,
    Validated,
    ReplayChecked,
    Dispatched,
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::AuthOrSignatureChecked => "auth_or_signature_checked",
            Stage::RateLimitChecked => "rate_limit_checked",
            Stage::Validated => "validated",
            Stage::ReplayChecked => "replay_checked",
            Stage::Dispatched => "dispatched",
            Stage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Dispatch(Dispatched),
    /// Webhook already processed inside the replay window.
    Duplicate { event_id: String },
    Rejected(BridgeError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub request_id: String,
    pub trail: Vec<Stage>,
    pub verdict: Verdict,
}

/// Who the caller is, for rate-limit keying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Ip(IpAddr),
    Principal(Principal),
}

impl Identity {
    pub fn rate_key(&self) -> String {
        match self {
            Identity::Ip(ip) => format!("ip:{ip}"),
            Identity::Principal(principal) => format!("user:{}", principal.id),
        }
    }
}

/// Everything the pipeline needs to know about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub client_ip: IpAddr,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestContext {
    fn header(&self, name: &str) -> Option<&str> {
        // Present but not visible ASCII reads as empty so it fails as malformed.
        self.headers.get(name).map(|v| v.to_str().unwrap_or(""))
    }

    fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT.as_str()).unwrap_or("-")
    }
}

/// Collaborators shared by the pipeline and the admin API.
#[derive(Debug, Clone)]
pub struct BridgeComponents {
    pub limiter: Arc<RateLimiter>,
    pub replay: Arc<dyn ReplayStore>,
    pub verifier: SignatureVerifier,
    pub guard: AuthGuard,
    pub clock: Arc<dyn Clock>,
}

impl BridgeComponents {
    /// Single-instance components backed by in-process stores.
    pub fn in_memory(config: &BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.clone(),
            Arc::new(MemoryRateLimitStore::new()),
            clock.clone(),
        ));
        let replay: Arc<dyn ReplayStore> = Arc::new(MemoryReplayStore::new(clock.clone()));
        let verifier = SignatureVerifier::new(
            config.webhook.secret.as_bytes().to_vec(),
            config.webhook.tolerance_secs,
            HeaderNames {
                signature: config.webhook.signature_header.to_ascii_lowercase(),
                timestamp: config.webhook.timestamp_header.to_ascii_lowercase(),
            },
            clock.clone(),
        );
        let guard = AuthGuard::new(Arc::new(StaticTokenVerifier::new(
            config.auth.tokens.clone(),
            clock.clone(),
        )));

        Self {
            limiter,
            replay,
            verifier,
            guard,
            clock,
        }
    }
}

/// Static knobs read once at startup.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Deadline for a single store call.
    pub store_timeout: Duration,
    pub replay_ttl: Duration,
    pub replay_policy: FailPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            store_timeout: Duration::from_millis(config.timeouts.store_ms),
            replay_ttl: Duration::from_secs(config.webhook.replay_ttl_secs),
            replay_policy: config.webhook.on_store_error,
        }
    }
}

/// A rejection plus the redacted identity to log with it.
struct Rejection {
    error: BridgeError,
    identity: Option<String>,
}

impl From<BridgeError> for Rejection {
    fn from(error: BridgeError) -> Self {
        Self { error, identity: None }
    }
}

type StageResult<T> = Result<T, Rejection>;

/// Request pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct Pipeline {
    components: BridgeComponents,
    dispatcher: Arc<dyn Dispatcher>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(components: BridgeComponents, dispatcher: Arc<dyn Dispatcher>, settings: PipelineSettings) -> Self {
        Self {
            components,
            dispatcher,
            settings,
        }
    }

    pub fn components(&self) -> &BridgeComponents {
        &self.components
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run `ctx` through the stages its route requires.
    pub async fn process(&self, route: &Route, ctx: RequestContext) -> Decision {
        let mut trail = vec![Stage::Received];

        let outcome = match &route.kind {
            RouteKind::Webhook => self.process_webhook(route, &ctx, &mut trail).await,
            RouteKind::Public { limiter } => self.process_public(route, *limiter, &ctx, &mut trail).await,
            RouteKind::Protected { limiter, ability } => {
                self.process_protected(route, *limiter, ability.as_deref(), &ctx, &mut trail)
                    .await
            }
        };

        let verdict = match outcome {
            Ok(verdict) => verdict,
            Err(rejection) => {
                trail.push(Stage::Rejected);
                self.log_rejection(route, &ctx, &rejection);
                Verdict::Rejected(rejection.error)
            }
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            route = %route.name,
            trail = ?trail,
            "Pipeline finished"
        );

        Decision {
            request_id: ctx.request_id,
            trail,
            verdict,
        }
    }

    async fn process_webhook(
        &self,
        route: &Route,
        ctx: &RequestContext,
        trail: &mut Vec<Stage>,
    ) -> StageResult<Verdict> {
        self.rate_limit(LimiterClass::Webhook, &Identity::Ip(ctx.client_ip)).await?;
        trail.push(Stage::RateLimitChecked);

        let headers = self.components.verifier.headers();
        let envelope = SignedWebhookEnvelope {
            body: &ctx.body,
            signature: ctx.header(&headers.signature),
            timestamp: ctx.header(&headers.timestamp),
        };
        self.components.verifier.verify(envelope).map_err(BridgeError::from)?;
        trail.push(Stage::AuthOrSignatureChecked);

        let payload = parse_webhook_payload(&ctx.body)?;
        trail.push(Stage::Validated);

        let event_id = event_identifier(&payload, &ctx.body);
        let recorded = match self.check_replay(&event_id).await? {
            Some(ReplayOutcome::Duplicate) => {
                trail.push(Stage::ReplayChecked);
                metrics::record_webhook_event("duplicate");
                tracing::info!(
                    request_id = %ctx.request_id,
                    event_id = %event_id,
                    "Duplicate webhook ignored"
                );
                return Ok(Verdict::Duplicate { event_id });
            }
            Some(ReplayOutcome::Fresh) => true,
            None => false,
        };
        trail.push(Stage::ReplayChecked);

        let event = self.dispatched(route, ctx, Some(event_id.clone()), None, payload);
        if let Err(e) = self.dispatcher.dispatch(event.clone()).await {
            if recorded {
                self.release_replay(&event_id).await;
            }
            return Err(BridgeError::Dispatch(e.to_string()).into());
        }
        trail.push(Stage::Dispatched);

        metrics::record_webhook_event("accepted");
        tracing::info!(
            request_id = %ctx.request_id,
            event_id = %event_id,
            "Webhook accepted"
        );
        Ok(Verdict::Dispatch(event))
    }

    async fn process_protected(
        &self,
        route: &Route,
        class: LimiterClass,
        ability: Option<&str>,
        ctx: &RequestContext,
        trail: &mut Vec<Stage>,
    ) -> StageResult<Verdict> {
        let authorization = ctx.header(header::AUTHORIZATION.as_str());
        let principal = self
            .components
            .guard
            .authenticate(authorization)
            .map_err(|failure| Rejection {
                error: failure.into(),
                identity: bearer_token(authorization).filter(|t| !t.is_empty()).map(redact::token),
            })?;

        if let Some(ability) = ability {
            self.components
                .guard
                .authorize(&principal, ability)
                .map_err(|forbidden| Rejection {
                    error: forbidden.into(),
                    identity: Some(redact::identity(&principal.id)),
                })?;
        }
        trail.push(Stage::AuthOrSignatureChecked);

        let principal_id = principal.id.clone();
        self.rate_limit(class, &Identity::Principal(principal)).await?;
        trail.push(Stage::RateLimitChecked);

        let payload = serde_json::from_slice(&ctx.body).unwrap_or(Value::Null);
        let event = self.dispatched(route, ctx, None, Some(principal_id), payload);
        self.dispatch(event, trail).await
    }

    async fn process_public(
        &self,
        route: &Route,
        class: LimiterClass,
        ctx: &RequestContext,
        trail: &mut Vec<Stage>,
    ) -> StageResult<Verdict> {
        self.rate_limit(class, &Identity::Ip(ctx.client_ip)).await?;
        trail.push(Stage::RateLimitChecked);

        let payload = serde_json::from_slice(&ctx.body).unwrap_or(Value::Null);
        let event = self.dispatched(route, ctx, None, None, payload);
        self.dispatch(event, trail).await
    }

    async fn dispatch(&self, event: Dispatched, trail: &mut Vec<Stage>) -> StageResult<Verdict> {
        self.dispatcher
            .dispatch(event.clone())
            .await
            .map_err(|e| BridgeError::Dispatch(e.to_string()))?;
        trail.push(Stage::Dispatched);
        Ok(Verdict::Dispatch(event))
    }

    fn dispatched(
        &self,
        route: &Route,
        ctx: &RequestContext,
        event_id: Option<String>,
        principal: Option<String>,
        payload: Value,
    ) -> Dispatched {
        Dispatched {
            request_id: ctx.request_id.clone(),
            route: route.name.clone(),
            method: ctx.method.to_string(),
            path: ctx.path.clone(),
            event_id,
            principal,
            payload,
            received_at: self.components.clock.now(),
        }
    }

    async fn rate_limit(&self, class: LimiterClass, identity: &Identity) -> Result<(), BridgeError> {
        let policy = self.components.limiter.config().on_backend_error;
        let key = identity.rate_key();

        let result = self
            .with_deadline(self.components.limiter.check(class, &key))
            .await;

        match result {
            Ok(RateDecision::Allowed { .. }) => Ok(()),
            Ok(RateDecision::Limited { retry_after_secs }) => {
                metrics::record_rate_limited(class.as_str());
                Err(BridgeError::RateLimited {
                    class: class.as_str(),
                    retry_after_secs,
                })
            }
            Err(e) => {
                metrics::record_backend_error("rate_limit", policy.as_str());
                match policy {
                    FailPolicy::Open => {
                        tracing::warn!(error = %e, limiter = %class, "Rate limit store failed, allowing request");
                        Ok(())
                    }
                    FailPolicy::Closed => {
                        tracing::error!(error = %e, limiter = %class, "Rate limit store failed, rejecting request");
                        Err(BridgeError::BackendUnavailable { backend: "rate_limit" })
                    }
                }
            }
        }
    }

    /// `None` when the store failed and the policy lets the request through
    /// unrecorded.
    async fn check_replay(&self, event_id: &str) -> Result<Option<ReplayOutcome>, BridgeError> {
        let policy = self.settings.replay_policy;
        let result = self
            .with_deadline(
                self.components
                    .replay
                    .check_and_record(event_id, self.settings.replay_ttl),
            )
            .await;

        match result {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                metrics::record_backend_error("replay", policy.as_str());
                match policy {
                    FailPolicy::Open => {
                        tracing::warn!(error = %e, "Replay store failed, accepting webhook without idempotency");
                        Ok(None)
                    }
                    FailPolicy::Closed => {
                        tracing::error!(error = %e, "Replay store failed, rejecting webhook");
                        Err(BridgeError::BackendUnavailable { backend: "replay" })
                    }
                }
            }
        }
    }

    async fn release_replay(&self, event_id: &str) {
        let result = self
            .with_deadline(self.components.replay.release(event_id))
            .await;
        if let Err(e) = result {
            metrics::record_backend_error("replay", "release");
            tracing::error!(error = %e, event_id = %event_id, "Failed to release replay record");
        }
    }

    async fn with_deadline<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        let deadline = self.settings.store_timeout;
        tokio::time::timeout(deadline, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(deadline)))
    }

    fn log_rejection(&self, route: &Route, ctx: &RequestContext, rejection: &Rejection) {
        let error = &rejection.error;
        metrics::record_rejection(error.code());
        if route.kind == RouteKind::Webhook {
            metrics::record_webhook_event("rejected");
        }

        let identity = rejection.identity.as_deref().unwrap_or("-");
        if error.is_security_rejection() {
            let payload = match &route.kind {
                RouteKind::Webhook => serde_json::from_slice::<Value>(&ctx.body)
                    .map(|v| redact::payload(&v))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };
            tracing::warn!(
                request_id = %ctx.request_id,
                route = %route.name,
                client_ip = %ctx.client_ip,
                user_agent = %ctx.user_agent(),
                error_code = error.code(),
                identity = %identity,
                payload = %payload,
                "Request rejected"
            );
        } else {
            tracing::warn!(
                request_id = %ctx.request_id,
                route = %route.name,
                client_ip = %ctx.client_ip,
                user_agent = %ctx.user_agent(),
                error_code = error.code(),
                "Request rejected"
            );
        }
    }
}

fn parse_webhook_payload(body: &[u8]) -> Result<Value, BridgeError> {
    let payload: Value = serde_json::from_slice(body).map_err(|_| BridgeError::Validation {
        message: "Payload is not valid JSON".to_string(),
        details: Some(serde_json::json!({ "payload": ["must be valid JSON"] })),
    })?;

    validation::validate_webhook(&payload).map_err(|errors| BridgeError::Validation {
        message: "The given data was invalid".to_string(),
        details: Some(validation::to_details(&errors)),
    })?;

    Ok(payload)
}
