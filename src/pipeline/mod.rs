//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Matched route + RequestContext
//!     → orchestrator.rs (ordered checks per route class)
//!         → security::{rate_limit, signature, auth, replay}
//!         → validation.rs (webhook payload rules)
//!     → dispatch.rs (hand accepted requests to the Dispatcher)
//!     → Decision { request_id, trail, verdict }
//! ```

pub mod dispatch;
pub mod orchestrator;
pub mod validation;

pub use dispatch::{DispatchError, Dispatched, Dispatcher, QueueDispatcher};
pub use orchestrator::{
    BridgeComponents, Decision, Identity, Pipeline, PipelineSettings, RequestContext, Stage, Verdict,
};
