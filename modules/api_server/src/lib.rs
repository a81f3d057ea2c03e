//! The real-time core of the starmap API: event broker, WebSocket hub,
//! SSE broadcaster, router and middleware pipeline, rate limiter, request
//! cache and the server lifecycle that ties them together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod openapi;
pub mod ratelimit;
pub mod response;
pub mod sse;
pub mod trace;
pub mod ws;

pub use config::ApiConfig;
pub use error::ApiError;

use broker::Broker;
use cache::Cache;
use catalog::{Catalog, Model, SyncEngine};
use events::EventKind;
use metrics::Metrics;
use ratelimit::RateLimiter;
use sse::{SseBroadcaster, SseSubscriber};
use ws::{Hub, HubSubscriber};

/// Bounded drain: each background loop gets this long to exit on shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state behind every handler and middleware.
pub struct AppState {
    pub config: ApiConfig,
    pub catalog: Arc<Catalog>,
    pub sync: Arc<dyn SyncEngine>,
    pub broker: Arc<Broker>,
    pub hub: Arc<Hub>,
    pub sse: Arc<SseBroadcaster>,
    pub cache: Arc<Cache>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub metrics: Arc<Metrics>,
    pub started_at: Instant,
}

/// Owns the broker, transports, cache, rate limiter and the root
/// cancellation token. `start` spawns the background loops; `shutdown`
/// cancels the token and drains them with a bounded wait.
pub struct ApiServer {
    state: Arc<AppState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, catalog: Arc<Catalog>, sync: Arc<dyn SyncEngine>) -> Self {
        let broker = Arc::new(Broker::new());
        let hub = Arc::new(Hub::new());
        let sse = Arc::new(SseBroadcaster::new());
        let cache = Arc::new(Cache::new(config.cache_ttl));
        let metrics = Arc::new(Metrics::new());
        let limiter = (config.rate_limit > 0).then(|| Arc::new(RateLimiter::new(config.rate_limit)));

        // Transports subscribe before the event loop starts; the buffered
        // register queue absorbs these.
        broker.subscribe(Arc::new(HubSubscriber::new(hub.clone())));
        broker.subscribe(Arc::new(SseSubscriber::new(sse.clone())));

        install_catalog_hooks(&catalog, &broker);

        let state = Arc::new(AppState {
            config,
            catalog,
            sync,
            broker,
            hub,
            sse,
            cache,
            limiter,
            metrics,
            started_at: Instant::now(),
        });

        Self {
            state,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the background loops: broker, hub, broadcaster, cache sweeper
    /// and (when enabled) the rate-limit sweeper.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();

        let broker = self.state.broker.clone();
        tasks.push((
            "broker",
            tokio::spawn(broker.run(self.cancel.child_token())),
        ));

        let hub = self.state.hub.clone();
        tasks.push(("ws-hub", tokio::spawn(hub.run(self.cancel.child_token()))));

        let sse = self.state.sse.clone();
        tasks.push((
            "sse-broadcaster",
            tokio::spawn(sse.run(self.cancel.child_token())),
        ));

        let cache = self.state.cache.clone();
        tasks.push((
            "cache-sweeper",
            tokio::spawn(cache.run_sweeper(self.cancel.child_token())),
        ));

        if let Some(limiter) = &self.state.limiter {
            let limiter = limiter.clone();
            tasks.push((
                "ratelimit-sweeper",
                tokio::spawn(limiter.run_sweeper(self.cancel.child_token())),
            ));
        }

        tracing::info!(loops = tasks.len(), "background loops started");
    }

    /// Build the router with the full middleware pipeline.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until the root token is cancelled.
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let router = self.router();
        let cancel = self.cancel.clone();

        tracing::info!(addr = %listener.local_addr()?, "http server bound");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("http server shutting down gracefully");
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    /// Cancel the root token and wait up to [`DRAIN_TIMEOUT`] per loop.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let tasks: Vec<(&'static str, JoinHandle<()>)> = self.tasks.lock().drain(..).collect();
        for (name, handle) in tasks {
            match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "background loop panicked"),
                Err(_) => {
                    tracing::warn!(task = name, "background loop did not stop within drain budget")
                }
            }
        }
        tracing::info!("api server stopped");
    }
}

/// Catalog mutation hooks run on the mutator's task: publish-or-drop only.
fn install_catalog_hooks(catalog: &Catalog, broker: &Arc<Broker>) {
    fn model_json(model: &Model) -> serde_json::Value {
        serde_json::to_value(model).unwrap_or_else(|_| json!({ "id": model.id }))
    }

    let b = broker.clone();
    catalog.on_model_added(Box::new(move |model| {
        b.publish(EventKind::ModelAdded, model_json(model));
    }));

    let b = broker.clone();
    catalog.on_model_updated(Box::new(move |old, new| {
        b.publish(
            EventKind::ModelUpdated,
            json!({ "old": model_json(old), "new": model_json(new) }),
        );
    }));

    let b = broker.clone();
    catalog.on_model_removed(Box::new(move |model| {
        b.publish(EventKind::ModelDeleted, json!({ "id": model.id }));
    }));
}

/// Middleware order, outermost first: Recovery → Logger (request-id +
/// trace) → CORS → Authentication → Rate limit → route handler. Layers are
/// added innermost-first below because each `.layer()` wraps what came
/// before it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();

    let api = Router::new()
        .route("/health", get(handlers::system::health))
        .route("/ready", get(handlers::system::ready))
        .route(
            "/models",
            get(handlers::models::list_models).post(handlers::models::search_models),
        )
        .route("/models/search", post(handlers::models::search_models))
        .route("/models/{id}", get(handlers::models::get_model))
        .route("/providers", get(handlers::providers::list_providers))
        .route("/providers/{id}", get(handlers::providers::get_provider))
        .route(
            "/providers/{id}/models",
            get(handlers::providers::provider_models),
        )
        .route("/update", post(handlers::sync::trigger_sync))
        .route("/stats", get(handlers::sync::stats))
        .route("/updates/ws", get(handlers::stream::ws_handler))
        .route("/updates/stream", get(handlers::stream::sse_handler))
        .route("/openapi.json", get(handlers::system::openapi_json))
        .route("/openapi.yaml", get(handlers::system::openapi_yaml))
        .route("/metrics", get(handlers::system::metrics));

    let mut router = Router::new()
        .route("/health", get(handlers::system::health))
        .route("/favicon.ico", get(handlers::system::favicon))
        .nest(&config.path_prefix, api)
        .fallback(handlers::system::not_found)
        .method_not_allowed_fallback(handlers::system::method_not_allowed)
        .with_state(state.clone());

    // innermost: body limit and request timeout sit right above the routes
    router = router.layer(RequestBodyLimitLayer::new(16 * 1024 * 1024));
    router = router.layer(TimeoutLayer::new(config.read_timeout));

    if config.rate_limit > 0 {
        router = router.layer(from_fn_with_state(state.clone(), middleware::rate_limit));
    }
    if config.auth_enabled {
        router = router.layer(from_fn_with_state(state.clone(), middleware::require_api_key));
    }
    if config.cors_enabled {
        router = router.layer(middleware::cors_layer(&config));
    }

    // request-id + trace ("Logger"): the id is set outside the trace layer,
    // so the span carries it from creation; Propagate echoes it back out
    router = router.layer(trace::trace_layer());
    router = router.layer(SetRequestIdLayer::new(
        trace::request_id_header(),
        trace::GenerateRequestId,
    ));
    router = router.layer(PropagateRequestIdLayer::new(trace::request_id_header()));

    router = router.layer(from_fn_with_state(state.clone(), middleware::track_requests));

    // outermost: recovery catches panics from everything below
    router = router.layer(middleware::recovery_layer(state.metrics.clone()));

    router
}
