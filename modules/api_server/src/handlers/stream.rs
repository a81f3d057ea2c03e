use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::{FromRequestParts, State, WebSocketUpgrade};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

use crate::ws;
use crate::AppState;

/// Remote peer address: first `X-Forwarded-For` entry, else the socket
/// address, else "unknown" (e.g. in-process test requests).
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(forwarded) = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
        {
            let forwarded = forwarded.trim();
            if !forwarded.is_empty() {
                return Ok(ClientAddr(forwarded.to_string()));
            }
        }
        let addr = parts
            .extensions
            .get::<ConnectInfo<std::net::SocketAddr>>()
            .map(|ci| ci.0.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientAddr(addr))
    }
}

/// `GET /updates/ws` — upgrade and hand the socket to the hub pumps.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ClientAddr(remote): ClientAddr,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade
        .max_message_size(ws::MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| ws::serve_connection(socket, state.hub.clone(), remote))
}

/// `GET /updates/stream` — SSE stream of catalog change events.
///
/// Frames are `event:` / `id:` (unix seconds) / `data:` (JSON); the stream
/// opens with a `connected` event. Client disconnect drops the stream and
/// with it the broadcaster registration.
pub async fn sse_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut client = state.sse.subscribe();
    let client_id = client.id();
    tracing::debug!(client = client_id, "sse stream opened");

    let stream = async_stream::stream! {
        yield Ok::<SseEvent, Infallible>(
            SseEvent::default()
                .event("connected")
                .id(Utc::now().timestamp().to_string())
                .data(json!({ "client_id": client_id }).to_string()),
        );

        while let Some(event) = client.recv().await {
            let data = match serde_json::to_string(&event.data) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(kind = %event.kind, error = %e, "failed to encode sse payload");
                    continue;
                }
            };
            yield Ok(SseEvent::default()
                .event(event.kind.as_str())
                .id(event.unix_seconds().to_string())
                .data(data));
        }
        tracing::debug!(client = client_id, "sse stream closed");
    };

    let mut response = Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}
