//! CRM integration bridge library.
//!
//! Security front door for a healthcare CRM: signed webhook ingestion with
//! replay protection, bearer-token authentication with ability checks, and
//! tiered rate limiting, all funnelled through one request pipeline.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod security;
pub mod time;

pub use config::schema::BridgeConfig;
pub use error::BridgeError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Dispatched, Dispatcher, Pipeline, QueueDispatcher};
