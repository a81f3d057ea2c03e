//! Request tracing. Every request carries an `x-request-id` (generated
//! when the client sent none, echoed onto the response) and an `http` span
//! with method, path, id, status and latency.
//!
//! The id layers run outside the trace layer, so the header is already in
//! place when the span is created and the span can carry it from the start.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{MakeRequestId, RequestId};
use tower_http::trace::{DefaultOnRequest, TraceLayer};
use tracing::Span;

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static("x-request-id")
}

/// Mints a fresh nanoid when a request arrives without an id.
#[derive(Clone, Default)]
pub struct GenerateRequestId;

impl MakeRequestId for GenerateRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value: HeaderValue = nanoid::nanoid!().parse().ok()?;
        Some(RequestId::new(value))
    }
}

fn http_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(request_id_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

fn finish_span(response: &Response<Body>, latency: Duration, _span: &Span) {
    tracing::info!(
        status = response.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );
}

/// Trace layer logging request_id/status/latency per request.
pub fn trace_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    fn(&Request<Body>) -> Span,
    DefaultOnRequest,
    fn(&Response<Body>, Duration, &Span),
> {
    TraceLayer::new_for_http()
        .make_span_with(http_span as fn(&Request<Body>) -> Span)
        .on_response(finish_span as fn(&Response<Body>, Duration, &Span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_header_values() {
        let mut generator = GenerateRequestId;
        let request = axum::http::Request::builder().body(()).unwrap();

        let id = generator
            .make_request_id(&request)
            .expect("nanoid must always produce a header-safe id");
        assert!(!id.header_value().is_empty());
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut generator = GenerateRequestId;
        let request = axum::http::Request::builder().body(()).unwrap();

        let a = generator.make_request_id(&request).unwrap();
        let b = generator.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
