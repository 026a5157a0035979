//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID generation / echo)
//!     → timeout.rs (request deadline, uniform 408)
//!     → routing (match method + path)
//!     → pipeline (security checks, dispatch)
//!     → response.rs (uniform JSON bodies, Retry-After)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod timeout;

pub use request::{MakeBridgeRequestId, X_REQUEST_ID};
pub use response::Rejection;
pub use server::{AppState, HttpServer};
