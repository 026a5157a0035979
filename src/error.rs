//! Request-level error taxonomy.
//!
//! Every rejection a client can see is a [`BridgeError`]. Each variant
//! carries its HTTP status and machine-readable `error_code`; rendering to
//! the uniform JSON body happens in `http::response`, where the request id
//! is known.

use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::security::auth::{AuthFailure, Forbidden};
use crate::security::signature::SignatureFailure;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Malformed input. `details` maps field names to messages.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    Authentication(AuthFailure),

    #[error("Forbidden: {0}")]
    Authorization(Forbidden),

    #[error("{0}")]
    Signature(SignatureFailure),

    #[error("Too many requests")]
    RateLimited {
        class: &'static str,
        retry_after_secs: u64,
    },

    /// A shared-state backend failed under a fail-closed policy.
    #[error("Service temporarily unavailable")]
    BackendUnavailable { backend: &'static str },

    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Route not found")]
    RouteNotFound,

    #[error("Request not completed within {after_secs}s")]
    RequestTimeout { after_secs: u64 },

    #[error("Event could not be dispatched: {0}")]
    Dispatch(String),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Authentication(_) => StatusCode::UNAUTHORIZED,
            BridgeError::Authorization(_) => StatusCode::FORBIDDEN,
            BridgeError::Signature(SignatureFailure::MissingHeader(_) | SignatureFailure::MalformedHeader(_)) => {
                StatusCode::BAD_REQUEST
            }
            BridgeError::Signature(_) => StatusCode::UNAUTHORIZED,
            BridgeError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            BridgeError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BridgeError::RouteNotFound => StatusCode::NOT_FOUND,
            BridgeError::RequestTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            BridgeError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Validation { .. } => "VALIDATION_ERROR",
            BridgeError::Authentication(AuthFailure::Unauthenticated) => "UNAUTHENTICATED",
            BridgeError::Authentication(AuthFailure::Expired) => "TOKEN_EXPIRED",
            BridgeError::Authentication(AuthFailure::Malformed) => "TOKEN_MALFORMED",
            BridgeError::Authorization(_) => "FORBIDDEN",
            BridgeError::Signature(SignatureFailure::MissingHeader(_)) => "SIGNATURE_MISSING_HEADER",
            BridgeError::Signature(SignatureFailure::MalformedHeader(_)) => "SIGNATURE_MALFORMED_HEADER",
            BridgeError::Signature(SignatureFailure::StaleTimestamp { .. }) => "SIGNATURE_STALE_TIMESTAMP",
            BridgeError::Signature(SignatureFailure::SignatureMismatch) => "SIGNATURE_MISMATCH",
            BridgeError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            BridgeError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            BridgeError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            BridgeError::RouteNotFound => "ROUTE_NOT_FOUND",
            BridgeError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            BridgeError::Dispatch(_) => "DISPATCH_FAILED",
        }
    }

    /// Structured details for the error body, when there are any.
    pub fn details(&self) -> Option<Value> {
        match self {
            BridgeError::Validation { details, .. } => details.clone(),
            BridgeError::Authorization(forbidden) => Some(serde_json::json!({ "required_ability": forbidden.ability })),
            BridgeError::Signature(SignatureFailure::MissingHeader(header) | SignatureFailure::MalformedHeader(header)) => {
                Some(serde_json::json!({ "header": header }))
            }
            BridgeError::RateLimited {
                class,
                retry_after_secs,
            } => Some(serde_json::json!({ "limiter": class, "retry_after": retry_after_secs })),
            _ => None,
        }
    }

    /// Seconds for the `Retry-After` header.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            BridgeError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// True for rejections that come from a caller failing a security check.
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            BridgeError::Authentication(_)
                | BridgeError::Authorization(_)
                | BridgeError::Signature(_)
                | BridgeError::RateLimited { .. }
        )
    }
}

impl From<AuthFailure> for BridgeError {
    fn from(err: AuthFailure) -> Self {
        BridgeError::Authentication(err)
    }
}

impl From<Forbidden> for BridgeError {
    fn from(err: Forbidden) -> Self {
        BridgeError::Authorization(err)
    }
}

impl From<SignatureFailure> for BridgeError {
    fn from(err: SignatureFailure) -> Self {
        BridgeError::Signature(err)
    }
}
