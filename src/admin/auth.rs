use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::error::BridgeError;
use crate::http::request::request_id_of;
use crate::http::response::Rejection;
use crate::http::server::AppState;
use crate::security::auth::{bearer_token, AuthFailure};

/// Require `Authorization: Bearer <admin api key>`.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let authorized = bearer_token(authorization)
        .is_some_and(|key| bool::from(key.as_bytes().ct_eq(state.admin_api_key.as_bytes())));
    if authorized {
        return next.run(request).await;
    }

    let request_id = request_id_of(request.headers());
    tracing::warn!(
        request_id = %request_id,
        path = %request.uri().path(),
        "Admin request rejected"
    );
    Rejection::new(BridgeError::Authentication(AuthFailure::Unauthenticated), request_id).into_response()
}
