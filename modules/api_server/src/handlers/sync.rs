use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use catalog::{SyncEngine, SyncOptions};

use crate::cache::CacheStats;
use crate::error::ApiError;
use crate::events::EventKind;
use crate::response::json_ok;
use crate::AppState;

/// `POST /update` — run a catalog sync. Publishes `sync.started`, applies
/// the diff, invalidates the cache wholesale, publishes `sync.completed`.
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SyncOptions>, JsonRejection>,
) -> Result<Response, ApiError> {
    let opts = match payload {
        Ok(Json(opts)) => opts,
        // a bare POST without a JSON body runs a full sync
        Err(JsonRejection::MissingJsonContentType(_)) => SyncOptions::default(),
        Err(rejection) => {
            return Err(ApiError::bad_request_with(
                "invalid sync options",
                rejection.body_text(),
            ))
        }
    };

    state
        .broker
        .publish(EventKind::SyncStarted, json!({ "dry_run": opts.dry_run }));

    let report = state.sync.sync(opts).await?;

    if !report.dry_run {
        state.cache.clear();
    }
    let data = serde_json::to_value(report).map_err(ApiError::internal)?;
    state.broker.publish(EventKind::SyncCompleted, data.clone());

    Ok(json_ok(data))
}

#[derive(Debug, Serialize)]
pub struct EventStats {
    pub published: u64,
    pub dropped: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub models: usize,
    pub providers: usize,
    pub websocket_clients: usize,
    pub sse_clients: usize,
    pub subscribers: usize,
    pub events: EventStats,
    pub cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_visitors: Option<usize>,
}

/// `GET /stats` — live service counters.
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    Ok(json_ok(StatsResponse {
        service: "starmap-api",
        version: "v1",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        models: state.catalog.model_count(),
        providers: state.catalog.provider_count(),
        websocket_clients: state.hub.client_count(),
        sse_clients: state.sse.client_count(),
        subscribers: state.broker.subscriber_count(),
        events: EventStats {
            published: state.broker.published_total(),
            dropped: state.broker.dropped_total(),
        },
        cache: state.cache.stats(),
        rate_limit_visitors: state.limiter.as_ref().map(|l| l.visitor_count()),
    }))
}
