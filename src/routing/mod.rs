//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched Route (with its RouteKind) or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile matchers
//!     → Sort by priority, then prefix length
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - First match wins

pub mod matcher;
pub mod router;

pub use router::{Route, RouteTable};
