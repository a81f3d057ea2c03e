use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::ApiError;
use crate::openapi;
use crate::response::json_ok;
use crate::AppState;

pub async fn health() -> Response {
    json_ok(json!({
        "status": "healthy",
        "service": "starmap-api",
        "version": "v1",
    }))
}

/// Ready once the catalog holds a snapshot.
pub async fn ready(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    if state.catalog.model_count() == 0 {
        return Err(ApiError::Unavailable("catalog not loaded".to_string()));
    }
    Ok(json_ok(json!({ "status": "ready" })))
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("resource not found".to_string())
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

pub async fn openapi_json() -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        openapi::OPENAPI_JSON,
    )
        .into_response()
}

pub async fn openapi_yaml() -> Response {
    (
        [(header::CONTENT_TYPE, "application/yaml")],
        openapi::openapi_yaml(),
    )
        .into_response()
}

/// Plaintext key/value metrics. 404 when disabled by configuration.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    if !state.config.metrics_enabled {
        return Err(ApiError::NotFound("metrics disabled".to_string()));
    }

    let cache = state.cache.stats();
    let mut gauges: Vec<(&str, u64)> = vec![
        ("uptime_seconds", state.started_at.elapsed().as_secs()),
        ("catalog_models", state.catalog.model_count() as u64),
        ("catalog_providers", state.catalog.provider_count() as u64),
        ("broker_subscribers", state.broker.subscriber_count() as u64),
        ("events_published_total", state.broker.published_total()),
        ("events_dropped_total", state.broker.dropped_total()),
        ("ws_clients", state.hub.client_count() as u64),
        ("ws_broadcasts_dropped_total", state.hub.dropped_total()),
        ("sse_clients", state.sse.client_count() as u64),
        ("sse_events_skipped_total", state.sse.skipped_total()),
        ("cache_items", cache.items as u64),
        ("cache_hits_total", cache.hits),
        ("cache_misses_total", cache.misses),
    ];
    if let Some(limiter) = &state.limiter {
        gauges.push(("rate_limit_visitors", limiter.visitor_count() as u64));
    }

    let body = state.metrics.render(&gauges);
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}
