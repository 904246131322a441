//! guild-api: HTTP gateway for the hello service.
//!
//! Dispatches `/hello` to a warm-pool slot under an invocation timeout and
//! exposes read-only operator views of the pool, alarms, and metrics.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET, POST | `/hello` | Greeting (`?name=` or `{"name": ...}`) |
//! | GET | `/healthz` | Liveness plus service metadata |
//! | GET | `/api/v1/pool` | Live pool counters and controller status |
//! | GET | `/api/v1/alarms` | Alarm records |
//! | GET | `/api/v1/metrics` | Recent period snapshots |
//! | GET | `/metrics` | Prometheus exposition |

pub mod error;
pub mod handlers;
pub mod hello;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;

use guild_core::ServiceInfo;
use guild_greeter::Greeter;
use guild_metrics::MetricsCollector;
use guild_runtime::WarmPool;
use guild_state::StateStore;

pub use error::InvocationError;

/// Request header carrying a caller-requested timeout in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-invocation-timeout-ms";

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub pool: Arc<WarmPool<Greeter>>,
    pub metrics: Arc<MetricsCollector>,
    pub service: ServiceInfo,
    /// Upper bound for a single invocation.
    pub invocation_timeout: Duration,
}

/// Build the complete router (hello + operator views + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/pool", get(handlers::pool_status))
        .route("/alarms", get(handlers::list_alarms))
        .route("/metrics", get(handlers::recent_metrics))
        .with_state(state.clone());

    Router::new()
        .route("/hello", get(hello::hello).post(hello::hello))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
        .nest("/api/v1", api_routes)
}
