//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (resolve caller IP, trusted proxies only)
//!     → rate_limit.rs (per class + identity windows)
//!     → signature.rs (webhook HMAC + freshness)  |  auth.rs (bearer + abilities)
//!     → replay.rs (webhook idempotency)
//!     → Pass to dispatch
//!
//! Background:
//!     sweeper.rs evicts idle buckets and expired replay records
//! ```
//!
//! # Design Decisions
//! - Fail closed on verification failures
//! - Backend outages follow an explicit per-backend policy
//! - Nothing sensitive is logged without going through redact.rs

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod redact;
pub mod replay;
pub mod signature;
pub mod sweeper;
