//! Router integration tests: request in, envelope out, through the full
//! middleware pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::TimeZone;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use api_server::{ApiConfig, ApiServer};
use catalog::{
    Catalog, Features, Limits, Model, Provider, ProviderRegistry, RegistrySnapshot, RegistrySync,
};

fn model(id: &str, name: &str, context: u64) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        provider: "acme".to_string(),
        description: None,
        modalities: Default::default(),
        features: Features {
            streaming: true,
            ..Default::default()
        },
        tags: vec![],
        open_weights: false,
        limits: Limits {
            context_window: context,
            output_tokens: 4096,
        },
        released_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single(),
    }
}

fn provider(id: &str) -> Provider {
    Provider {
        id: id.to_string(),
        name: id.to_string(),
        homepage: None,
    }
}

fn seed_models() -> Vec<Model> {
    vec![
        model("gpt-4", "GPT-4", 128_000),
        model("claude-3", "Claude 3", 200_000),
        model("llama-3", "Llama 3", 8_192),
    ]
}

struct FixedRegistry(RegistrySnapshot);

impl ProviderRegistry for FixedRegistry {
    fn snapshot(&self) -> RegistrySnapshot {
        self.0.clone()
    }
}

fn test_server(config: ApiConfig) -> ApiServer {
    let catalog = Arc::new(Catalog::with_seed(seed_models(), vec![provider("acme")]));
    let registry = Arc::new(FixedRegistry(RegistrySnapshot {
        providers: vec![provider("acme")],
        models: seed_models(),
    }));
    let sync = Arc::new(RegistrySync::new(registry, catalog.clone()));
    ApiServer::new(config, catalog, sync)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_returns_service_identity() {
    let server = test_server(ApiConfig::default());
    let response = server.router().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "data": {"status": "healthy", "service": "starmap-api", "version": "v1"},
            "error": null,
        })
    );
}

#[tokio::test]
async fn health_is_served_under_the_prefix_too() {
    let server = test_server(ApiConfig::default());
    let response = server.router().oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_models_filters_and_paginates() {
    let server = test_server(ApiConfig::default());
    let response = server
        .router()
        .oneshot(get("/api/v1/models?min_context=100000&limit=1&offset=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["models"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["pagination"]["total"], 2);
    assert_eq!(body["data"]["pagination"]["limit"], 1);
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn get_model_hits_and_unknown_is_404() {
    let server = test_server(ApiConfig::default());

    let response = server
        .router()
        .oneshot(get("/api/v1/models/gpt-4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "gpt-4");

    let response = server
        .router()
        .oneshot(get("/api/v1/models/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn search_with_json_body() {
    let server = test_server(ApiConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/models/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"name_contains": "claude"}"#))
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["models"][0]["id"], "claude-3");
    assert_eq!(body["data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn search_with_invalid_body_is_400() {
    let server = test_server(ApiConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/models")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn providers_surface() {
    let server = test_server(ApiConfig::default());

    let response = server.router().oneshot(get("/api/v1/providers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 1);

    let response = server
        .router()
        .oneshot(get("/api/v1/providers/acme/models"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 3);

    let response = server
        .router()
        .oneshot(get("/api/v1/providers/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unauthorized_without_key_and_public_paths_exempt() {
    let config = ApiConfig {
        auth_enabled: true,
        auth_key: "k".to_string(),
        ..Default::default()
    };
    let server = test_server(config);

    // no header → 401
    let response = server.router().oneshot(get("/api/v1/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // public path exemption
    let response = server.router().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = server.router().oneshot(get("/api/v1/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // custom header
    let request = Request::builder()
        .uri("/api/v1/models")
        .header("X-API-Key", "k")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // bearer form
    let request = Request::builder()
        .uri("/api/v1/models")
        .header(header::AUTHORIZATION, "Bearer k")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // wrong key and empty value are both invalid
    let request = Request::builder()
        .uri("/api/v1/models")
        .header("X-API-Key", "wrong")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/models")
        .header("X-API-Key", "")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rate_limit_kicks_in_on_the_third_request() {
    let config = ApiConfig {
        rate_limit: 2,
        ..Default::default()
    };
    let server = test_server(config);
    let router = server.router();

    for expected in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
        let request = Request::builder()
            .uri("/api/v1/models")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected);

        if expected == StatusCode::TOO_MANY_REQUESTS {
            assert!(response.headers().contains_key(header::RETRY_AFTER));
            let body = body_json(response).await;
            assert_eq!(body["error"]["code"], "RATE_LIMITED");
        }
    }

    // a different IP is unaffected
    let request = Request::builder()
        .uri("/api/v1/models")
        .header("x-forwarded-for", "203.0.113.10")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn method_mismatch_is_405_with_envelope() {
    let server = test_server(ApiConfig::default());
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/models")
        .body(Body::empty())
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn unknown_paths_are_404_and_favicon_is_204() {
    let server = test_server(ApiConfig::default());

    let response = server
        .router()
        .oneshot(get("/api/v1/teapots/earl-grey"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let response = server.router().oneshot(get("/favicon.ico")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn cors_preflight_allows_all_when_configured() {
    let config = ApiConfig {
        cors_enabled: true,
        ..Default::default()
    };
    let server = test_server(config);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/v1/models")
        .header(header::ORIGIN, "https://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();

    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn cors_restricts_to_configured_origins() {
    let config = ApiConfig {
        cors_enabled: true,
        cors_origins: vec!["https://allowed.example".to_string()],
        ..Default::default()
    };
    let server = test_server(config);

    let request = Request::builder()
        .uri("/api/v1/models")
        .header(header::ORIGIN, "https://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://allowed.example")
    );

    let request = Request::builder()
        .uri("/api/v1/models")
        .header(header::ORIGIN, "https://denied.example")
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn openapi_documents_are_served() {
    let server = test_server(ApiConfig::default());

    let response = server
        .router()
        .oneshot(get("/api/v1/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );

    let response = server
        .router()
        .oneshot(get("/api/v1/openapi.yaml"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&bytes).contains("openapi:"));
}

#[tokio::test]
async fn metrics_render_plaintext_counters() {
    let server = test_server(ApiConfig::default());
    let router = server.router();

    // generate one request worth of counters first
    let _ = router.clone().oneshot(get("/health")).await.unwrap();

    let response = router.clone().oneshot(get("/api/v1/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("catalog_models 3"));
}

#[tokio::test]
async fn metrics_disabled_is_404() {
    let config = ApiConfig {
        metrics_enabled: false,
        ..Default::default()
    };
    let server = test_server(config);
    let response = server.router().oneshot(get("/api/v1/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sync_invalidates_the_cache() {
    let server = test_server(ApiConfig::default());
    let state = server.state();
    let router = server.router();

    // prime the cache
    let response = router.clone().oneshot(get("/api/v1/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.cache.item_count() >= 1);
    let misses_before = state.cache.stats().misses;

    // trigger a sync; the registry matches the seed, so no changes, but the
    // cache is still cleared wholesale
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/update")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["dry_run"], false);

    assert_eq!(state.cache.item_count(), 0, "sync must clear the cache");

    // next read is a miss again
    let response = router.clone().oneshot(get("/api/v1/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.cache.stats().misses > misses_before);
}

#[tokio::test]
async fn stats_expose_component_counters() {
    let server = test_server(ApiConfig::default());
    let response = server.router().oneshot(get("/api/v1/stats")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["service"], "starmap-api");
    assert_eq!(body["data"]["models"], 3);
    assert_eq!(body["data"]["providers"], 1);
    assert!(body["data"]["cache"]["items"].is_number());
}

#[tokio::test]
async fn background_loops_drain_within_the_budget() {
    let server = test_server(ApiConfig {
        rate_limit: 5,
        ..Default::default()
    });
    server.start();

    // give the loops a moment to pick up their tokens
    tokio::task::yield_now().await;

    tokio::time::timeout(Duration::from_secs(6), server.shutdown())
        .await
        .expect("all background loops must stop within the drain budget");
}
