use std::any::Any;
use std::net::IpAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response as AxumResponse};
use http_body_util::Full;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::ratelimit::RateDecision;
use crate::response::ApiResponse;
use crate::AppState;

// ----- recovery ---------------------------------------------------------

#[derive(Clone)]
pub struct PanicResponder {
    metrics: Arc<Metrics>,
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Full<Bytes>;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Full<Bytes>> {
        let detail = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            (*s).to_string()
        } else {
            "unknown panic payload".to_string()
        };
        self.metrics.record_panic();
        tracing::error!(panic = %detail, "handler panicked");

        let body = serde_json::to_vec(&ApiResponse::err(
            "INTERNAL_ERROR",
            "An unexpected error occurred",
            None,
        ))
        .unwrap_or_default();

        let mut response = Response::new(Full::from(body));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}

/// Outermost layer: panics anywhere below become a 500 envelope.
pub fn recovery_layer(metrics: Arc<Metrics>) -> CatchPanicLayer<PanicResponder> {
    CatchPanicLayer::custom(PanicResponder { metrics })
}

// ----- CORS -------------------------------------------------------------

pub fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ]);

    if config.cors_allow_all() {
        layer.allow_origin(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

// ----- authentication ---------------------------------------------------

/// Shared-secret header check. The configured header takes precedence over
/// `Authorization`; empty values are invalid; public paths are exempt.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> AxumResponse {
    if state.config.is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    let authorized = {
        let headers = req.headers();
        let provided = headers
            .get(state.config.auth_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .or_else(|| {
                headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim())
                    .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
            });

        matches!(
            provided,
            Some(key) if !key.is_empty()
                && !state.config.auth_key.is_empty()
                && key == state.config.auth_key
        )
    };

    if authorized {
        next.run(req).await
    } else {
        ApiError::Unauthorized("invalid or missing API key".to_string()).into_response()
    }
}

// ----- rate limiting ----------------------------------------------------

/// First `X-Forwarded-For` entry, else the socket address, else loopback.
pub fn client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> AxumResponse {
    let Some(limiter) = &state.limiter else {
        return next.run(req).await;
    };

    match limiter.check(client_ip(&req)) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Limited { retry_after } => {
            state.metrics.record_rate_limited();
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}

// ----- request accounting ----------------------------------------------

pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> AxumResponse {
    state.metrics.record_request();
    let response = next.run(req).await;
    state.metrics.record_status(response.status().as_u16());
    response
}
