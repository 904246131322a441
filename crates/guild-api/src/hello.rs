//! The `/hello` endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use guild_metrics::InvocationOutcome;
use guild_runtime::SlotKind;

use crate::error::InvocationError;
use crate::{ApiState, TIMEOUT_HEADER};

#[derive(Debug, Default, Deserialize)]
pub struct HelloQuery {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HelloResponse {
    pub message: String,
}

/// The timeout for one invocation: the caller's request, never above the
/// configured ceiling. Missing, zero, or unparsable values use the ceiling.
pub fn effective_timeout(headers: &HeaderMap, configured: Duration) -> Duration {
    headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(|ms| Duration::from_millis(ms).min(configured))
        .unwrap_or(configured)
}

/// GET|POST /hello
///
/// Each invocation runs on its own blocking task holding one pool slot.
/// A malformed query string is treated like an absent one.
pub async fn hello(
    State(state): State<ApiState>,
    headers: HeaderMap,
    query: Result<Query<HelloQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<HelloResponse>, InvocationError> {
    let timeout = effective_timeout(&headers, state.invocation_timeout);
    let query_name = query.ok().and_then(|Query(q)| q.name);

    let started = Instant::now();
    let pool = Arc::clone(&state.pool);
    let task = tokio::task::spawn_blocking(move || -> Result<(String, SlotKind), String> {
        let lease = pool.acquire().map_err(|e| format!("{e:#}"))?;
        let message = lease.context().handle(&body, query_name.as_deref());
        Ok((message, lease.kind()))
    });

    let outcome = tokio::time::timeout(timeout, task).await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(Ok((message, kind)))) => {
            let cold = kind == SlotKind::Cold;
            state
                .metrics
                .record_invocation(latency, InvocationOutcome::Success, cold);
            debug!(latency_ms = latency.as_millis() as u64, cold, "hello served");
            Ok(Json(HelloResponse { message }))
        }
        Ok(Ok(Err(reason))) => {
            error!(error = %reason, "no execution slot available");
            state
                .metrics
                .record_invocation(latency, InvocationOutcome::Fault, false);
            Err(InvocationError::Fault(reason))
        }
        Ok(Err(join)) => {
            error!(error = %join, "hello handler fault");
            state
                .metrics
                .record_invocation(latency, InvocationOutcome::Fault, false);
            Err(InvocationError::Fault(join.to_string()))
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "hello invocation timed out");
            state
                .metrics
                .record_invocation(latency, InvocationOutcome::Timeout, false);
            Err(InvocationError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(TIMEOUT_HEADER, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn timeout_defaults_to_configured() {
        let configured = Duration::from_secs(30);
        assert_eq!(effective_timeout(&HeaderMap::new(), configured), configured);
        assert_eq!(effective_timeout(&headers("soon"), configured), configured);
        assert_eq!(effective_timeout(&headers("0"), configured), configured);
    }

    #[test]
    fn timeout_is_min_of_requested_and_configured() {
        let configured = Duration::from_secs(30);
        assert_eq!(
            effective_timeout(&headers("250"), configured),
            Duration::from_millis(250)
        );
        assert_eq!(effective_timeout(&headers("90000"), configured), configured);
    }
}
