//! Request deadline.
//!
//! Every request must complete within `timeouts.request_secs`. A request
//! that runs over is dropped and answered with the uniform 408 body, so
//! callers see the same error shape as any other rejection.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::BridgeError;
use crate::http::request::request_id_of;
use crate::http::response::Rejection;
use crate::observability::metrics;

pub async fn request_timeout_middleware(
    State(limit): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = request_id_of(request.headers());
    let path = request.uri().path().to_string();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            let error = BridgeError::RequestTimeout {
                after_secs: limit.as_secs(),
            };
            tracing::warn!(
                request_id = %request_id,
                path = %path,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request timed out"
            );
            metrics::record_rejection(error.code());
            Rejection::new(error, request_id).into_response()
        }
    }
}
