//! Operator handlers.
//!
//! Read-only views over the state store and the live warm pool. Each
//! returns the `ApiResponse` JSON envelope, except `/metrics`.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use guild_runtime::PoolStats;
use guild_state::PoolStatus;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthInfo<'a> {
    status: &'static str,
    service: &'a str,
    environment: &'a str,
    version: &'a str,
}

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(HealthInfo {
        status: "ok",
        service: &state.service.name,
        environment: &state.service.environment,
        version: &state.service.version,
    })
    .into_response()
}

// ── Pool ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LivePool {
    capacity: u32,
    provisioned: u32,
    idle: u32,
    in_flight: u32,
    cold_starts: u64,
}

impl From<PoolStats> for LivePool {
    fn from(s: PoolStats) -> Self {
        Self {
            capacity: s.capacity,
            provisioned: s.provisioned,
            idle: s.idle,
            in_flight: s.in_flight,
            cold_starts: s.cold_starts,
        }
    }
}

#[derive(Debug, Serialize)]
struct PoolView {
    live: LivePool,
    /// Last state written by the concurrency controller.
    controller: Option<PoolStatus>,
}

/// GET /api/v1/pool
pub async fn pool_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.get_pool_status() {
        Ok(controller) => ApiResponse::ok(PoolView {
            live: state.pool.stats().into(),
            controller,
        })
        .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Alarms ─────────────────────────────────────────────────────

/// GET /api/v1/alarms
pub async fn list_alarms(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_alarms() {
        Ok(alarms) => ApiResponse::ok(alarms).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Metrics ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/metrics?limit=N
///
/// Newest first. Defaults to the last hour at the default period.
pub async fn recent_metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(60).min(1440);
    match state.store.list_recent_metrics(limit) {
        Ok(metrics) => ApiResponse::ok(metrics).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.latest_metrics().unwrap_or_default();
    let pool = state.store.get_pool_status().unwrap_or_default();
    let alarms = state.store.list_alarms().unwrap_or_default();

    let body = guild_metrics::render_prometheus(snapshot.as_ref(), pool.as_ref(), &alarms);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
