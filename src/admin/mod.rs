//! Admin API.
//!
//! Read-only introspection of the bridge's security state, protected by a
//! bearer admin key. Mounted only when `admin.enabled` is set.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/limits", get(get_limits))
        .route("/admin/replay", get(get_replay))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
