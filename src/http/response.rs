//! Response rendering.
//!
//! # Responsibilities
//! - Render every rejection as the uniform JSON error body
//! - Render accepted and duplicate outcomes
//! - Attach `Retry-After` to rate-limit rejections
//!
//! # Design Decisions
//! - Duplicates are 200 with `status: "duplicate"`, never an error
//! - Timestamps are RFC 3339 UTC

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::BridgeError;
use crate::pipeline::{Decision, Verdict};

/// Uniform error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: String,
    pub request_id: String,
}

/// Body for accepted and duplicate outcomes.
#[derive(Debug, Serialize)]
pub struct SuccessBody {
    pub success: bool,
    pub status: &'static str,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A [`BridgeError`] bound to the request it rejects.
#[derive(Debug)]
pub struct Rejection {
    pub error: BridgeError,
    pub request_id: String,
}

impl Rejection {
    pub fn new(error: BridgeError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.error.to_string(),
            error_code: self.error.code(),
            details: self.error.details(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            request_id: self.request_id,
        };

        let mut response = (self.error.status(), Json(body)).into_response();
        if let Some(secs) = self.error.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Render a pipeline decision.
pub fn decision_response(decision: Decision) -> Response {
    match decision.verdict {
        Verdict::Dispatch(event) => (
            StatusCode::OK,
            Json(SuccessBody {
                success: true,
                status: "accepted",
                request_id: decision.request_id,
                event_id: event.event_id,
                data: None,
            }),
        )
            .into_response(),
        Verdict::Duplicate { event_id } => (
            StatusCode::OK,
            Json(SuccessBody {
                success: true,
                status: "duplicate",
                request_id: decision.request_id,
                event_id: Some(event_id),
                data: Some(serde_json::json!({ "message": "Event already processed" })),
            }),
        )
            .into_response(),
        Verdict::Rejected(error) => Rejection::new(error, decision.request_id).into_response(),
    }
}
