//! Webhook replay protection and idempotency.
//!
//! Each accepted webhook is recorded under a deterministic identifier for a
//! TTL window. A second envelope with the same identifier inside the window
//! is a duplicate and must not be processed again.
//!
//! # Design Decisions
//! - Check-and-insert is one atomic step (DashMap entry lock), never a
//!   separate read followed by a write
//! - Expired records never block reuse of an identifier
//! - Backends report failures as `StoreError`; the caller picks the policy

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::time::Clock;

/// Soft cap before the memory store purges expired entries inline.
const MAX_ENTRIES: usize = 100_000;

/// Result of recording an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Fresh,
    Duplicate,
}

/// Shared-state backend failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    #[error("store backend timed out after {0:?}")]
    Timeout(Duration),
}

/// Backend holding replay records.
pub trait ReplayStore: Send + Sync + Debug {
    /// Record `identifier` unless a live record exists.
    fn check_and_record<'a>(
        &'a self,
        identifier: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<ReplayOutcome, StoreError>>;

    /// Forget `identifier` so the sender may retry.
    fn release<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Drop expired records, returning how many were removed.
    fn purge_expired(&self) -> usize {
        0
    }

    /// Number of records currently held, if the backend can tell cheaply.
    fn len(&self) -> usize {
        0
    }
}

/// In-process replay store.
#[derive(Debug)]
pub struct MemoryReplayStore {
    /// identifier -> expires-at (unix seconds)
    records: DashMap<String, i64>,
    clock: Arc<dyn Clock>,
}

impl MemoryReplayStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    fn record(&self, identifier: &str, ttl: Duration) -> ReplayOutcome {
        let now = self.clock.now();
        if self.records.len() > MAX_ENTRIES {
            self.purge_expired();
        }

        let expires_at = now + ttl.as_secs() as i64;
        match self.records.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    ReplayOutcome::Duplicate
                } else {
                    occupied.insert(expires_at);
                    ReplayOutcome::Fresh
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                ReplayOutcome::Fresh
            }
        }
    }
}

impl ReplayStore for MemoryReplayStore {
    fn check_and_record<'a>(
        &'a self,
        identifier: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<ReplayOutcome, StoreError>> {
        let outcome = self.record(identifier, ttl);
        async move { Ok(outcome) }.boxed()
    }

    fn release<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        self.records.remove(identifier);
        async { Ok(()) }.boxed()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.records.len())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Deterministic identifier for a webhook payload.
///
/// `evt:{event}:{account}:{id}` when the payload carries an `id`, otherwise
/// `sha256:{digest of the raw body}`.
pub fn event_identifier(payload: &Value, raw_body: &[u8]) -> String {
    let id = payload.get("id").and_then(scalar);
    match id {
        Some(id) => {
            let event = payload
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or("-");
            let account = payload
                .pointer("/account/id")
                .or_else(|| payload.get("account_id"))
                .or_else(|| payload.pointer("/conversation/account_id"))
                .and_then(scalar)
                .unwrap_or_else(|| "-".to_string());
            format!("evt:{event}:{account}:{id}")
        }
        None => format!("sha256:{}", hex::encode(Sha256::digest(raw_body))),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
