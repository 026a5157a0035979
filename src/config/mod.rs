//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + BRIDGE_* environment
//!     → loader.rs (parse, deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → shared with subsystems at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → rate-limit ceilings swapped atomically (arc-swap)
//!     → other sections take effect on restart
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Secrets may come from the environment rather than the file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::BridgeConfig;
pub use schema::FailPolicy;
pub use schema::RateLimitConfig;
pub use schema::RouteConfig;
pub use schema::RouteKind;
pub use schema::TokenConfig;
