//! Request identification.
//!
//! # Responsibilities
//! - Generate a `req_<32 hex>` id when the caller did not send one
//! - Read the id back out of the headers for handlers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A caller-supplied `X-Request-ID` is kept and echoed

use axum::http::{HeaderMap, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header name for request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request id generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeBridgeRequestId;

impl MakeRequestId for MakeBridgeRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&new_request_id()).ok().map(RequestId::new)
    }
}

pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

/// Request id set by the request-id layer, or a fresh one.
pub fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_format() {
        let id = new_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 36);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_existing_id_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id_of(&headers), "abc-123");
        assert!(request_id_of(&HeaderMap::new()).starts_with("req_"));
    }

    #[test]
    fn test_layer_generator() {
        let request = Request::new(());
        let id = MakeBridgeRequestId.make_request_id(&request).unwrap();
        assert!(id.header_value().to_str().unwrap().starts_with("req_"));
    }
}
