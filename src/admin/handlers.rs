use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::schema::{Ceilings, FailPolicy};
use crate::http::server::AppState;
use crate::security::rate_limit::LimiterClass;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub rate_limit_buckets: usize,
    pub replay_records: usize,
}

#[derive(Debug, Serialize)]
pub struct LimiterStatus {
    pub class: LimiterClass,
    pub per_minute: u32,
    pub per_hour: u32,
}

#[derive(Debug, Serialize)]
pub struct LimitsSummary {
    pub enabled: bool,
    pub on_backend_error: FailPolicy,
    pub tracked_buckets: usize,
    pub classes: Vec<LimiterStatus>,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub records: usize,
    pub ttl_secs: u64,
    pub on_store_error: FailPolicy,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let components = state.pipeline.components();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: state.routes.len(),
        rate_limit_buckets: components.limiter.tracked_buckets(),
        replay_records: components.replay.len(),
    })
}

pub async fn get_limits(State(state): State<AppState>) -> Json<LimitsSummary> {
    let limiter = &state.pipeline.components().limiter;
    let config = limiter.config();

    let classes = LimiterClass::ALL
        .iter()
        .map(|&class| {
            let Ceilings { per_minute, per_hour } = config.classes.get(class);
            LimiterStatus {
                class,
                per_minute,
                per_hour,
            }
        })
        .collect();

    Json(LimitsSummary {
        enabled: config.enabled,
        on_backend_error: config.on_backend_error,
        tracked_buckets: limiter.tracked_buckets(),
        classes,
    })
}

pub async fn get_replay(State(state): State<AppState>) -> Json<ReplaySummary> {
    let settings = state.pipeline.settings();

    Json(ReplaySummary {
        records: state.pipeline.components().replay.len(),
        ttl_secs: settings.replay_ttl.as_secs(),
        on_store_error: settings.replay_policy,
    })
}
