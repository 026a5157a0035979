//! Tiered rate limiting per (limiter class, identity).
//!
//! Every class carries two ceilings, per minute and per hour. Windows are
//! fixed and aligned to the first request a bucket sees: when `now` crosses
//! `start + length` the start advances by whole windows and the count resets.
//!
//! # Design Decisions
//! - Check and increment happen under one DashMap entry lock per key
//! - Limited requests do not consume budget
//! - Retry-After is the wait until a request could succeed again
//! - Ceilings are hot-swappable without touching live buckets

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::schema::{Ceilings, RateLimitConfig};
use crate::security::replay::StoreError;
use crate::time::Clock;

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;

/// Named rate-limit policy bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterClass {
    Login,
    Refresh,
    Api,
    Ai,
    Lgpd,
    Export,
    Webhook,
}

impl LimiterClass {
    pub const ALL: [LimiterClass; 7] = [
        LimiterClass::Login,
        LimiterClass::Refresh,
        LimiterClass::Api,
        LimiterClass::Ai,
        LimiterClass::Lgpd,
        LimiterClass::Export,
        LimiterClass::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterClass::Login => "login",
            LimiterClass::Refresh => "refresh",
            LimiterClass::Api => "api",
            LimiterClass::Ai => "ai",
            LimiterClass::Lgpd => "lgpd",
            LimiterClass::Export => "export",
            LimiterClass::Webhook => "webhook",
        }
    }
}

impl fmt::Display for LimiterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Key of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub class: LimiterClass,
    pub identity: String,
}

/// Fixed-window counters for one key.
#[derive(Debug, Clone)]
struct Bucket {
    minute_start: i64,
    minute_count: u32,
    hour_start: i64,
    hour_count: u32,
}

impl Bucket {
    fn new(now: i64) -> Self {
        Self {
            minute_start: now,
            minute_count: 0,
            hour_start: now,
            hour_count: 0,
        }
    }

    fn roll(&mut self, now: i64) {
        if now - self.minute_start >= MINUTE {
            self.minute_start += (now - self.minute_start) / MINUTE * MINUTE;
            self.minute_count = 0;
        }
        if now - self.hour_start >= HOUR {
            self.hour_start += (now - self.hour_start) / HOUR * HOUR;
            self.hour_count = 0;
        }
    }

    fn try_acquire(&mut self, now: i64, ceilings: Ceilings) -> RateDecision {
        self.roll(now);

        let mut retry_after = None;
        if self.minute_count >= ceilings.per_minute {
            retry_after = Some(self.minute_start + MINUTE - now);
        }
        if self.hour_count >= ceilings.per_hour {
            let hour_wait = self.hour_start + HOUR - now;
            retry_after = Some(retry_after.map_or(hour_wait, |w: i64| w.max(hour_wait)));
        }
        if let Some(wait) = retry_after {
            return RateDecision::Limited {
                retry_after_secs: wait.max(1) as u64,
            };
        }

        self.minute_count += 1;
        self.hour_count += 1;
        RateDecision::Allowed {
            remaining: (ceilings.per_minute - self.minute_count)
                .min(ceilings.per_hour - self.hour_count),
        }
    }

    /// Both windows have elapsed, so the bucket holds no live state.
    fn is_idle(&self, now: i64) -> bool {
        now - self.hour_start >= HOUR && now - self.minute_start >= MINUTE
    }
}

/// Backend holding rate-limit buckets.
pub trait RateLimitStore: Send + Sync + fmt::Debug {
    /// Atomically check and count one request against `key`.
    fn hit<'a>(
        &'a self,
        key: &'a BucketKey,
        ceilings: Ceilings,
        now: i64,
    ) -> BoxFuture<'a, Result<RateDecision, StoreError>>;

    /// Drop buckets with no live window, returning how many were removed.
    fn purge_expired(&self, _now: i64) -> usize {
        0
    }

    fn len(&self) -> usize {
        0
    }
}

/// In-process bucket store.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    buckets: DashMap<BucketKey, Bucket>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn hit<'a>(
        &'a self,
        key: &'a BucketKey,
        ceilings: Ceilings,
        now: i64,
    ) -> BoxFuture<'a, Result<RateDecision, StoreError>> {
        let decision = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::new(now))
            .try_acquire(now, ceilings);
        async move { Ok(decision) }.boxed()
    }

    fn purge_expired(&self, now: i64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(now));
        before.saturating_sub(self.buckets.len())
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Rate limiter applying configured ceilings to a bucket store.
pub struct RateLimiter {
    config: ArcSwap<RateLimitConfig>,
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            store,
            clock,
        }
    }

    /// Check one request from `identity` against `class`.
    pub async fn check(&self, class: LimiterClass, identity: &str) -> Result<RateDecision, StoreError> {
        let (enabled, ceilings) = {
            let config = self.config.load();
            (config.enabled, config.classes.get(class))
        };
        if !enabled {
            return Ok(RateDecision::Allowed { remaining: u32::MAX });
        }

        let key = BucketKey {
            class,
            identity: identity.to_string(),
        };
        self.store.hit(&key, ceilings, self.clock.now()).await
    }

    /// Swap in new ceilings. Existing counters are kept.
    pub fn update_config(&self, config: RateLimitConfig) {
        tracing::info!(enabled = config.enabled, "Rate limit configuration updated");
        self.config.store(Arc::new(config));
    }

    pub fn config(&self) -> Arc<RateLimitConfig> {
        self.config.load_full()
    }

    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.clock.now())
    }

    pub fn tracked_buckets(&self) -> usize {
        self.store.len()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
