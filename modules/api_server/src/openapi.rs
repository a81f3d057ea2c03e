use std::sync::OnceLock;

/// Static OpenAPI document for the HTTP surface. Served as-is; the YAML
/// rendering is derived from the JSON source once, on first request.
pub const OPENAPI_JSON: &str = r##"{
  "openapi": "3.0.3",
  "info": {
    "title": "Starmap API",
    "description": "Read-mostly model catalog with real-time change streaming",
    "version": "v1"
  },
  "paths": {
    "/api/v1/models": {
      "get": {
        "operationId": "models:list",
        "summary": "List models with optional filtering and pagination",
        "parameters": [
          {"name": "provider", "in": "query", "schema": {"type": "string"}},
          {"name": "name_contains", "in": "query", "schema": {"type": "string"}},
          {"name": "min_context", "in": "query", "schema": {"type": "integer"}},
          {"name": "limit", "in": "query", "schema": {"type": "integer", "default": 100}},
          {"name": "offset", "in": "query", "schema": {"type": "integer", "default": 0}}
        ],
        "responses": {"200": {"description": "Filtered model page"}}
      },
      "post": {
        "operationId": "models:search",
        "summary": "Search models (JSON body, same options as the query string)",
        "responses": {"200": {"description": "Filtered model page"}}
      }
    },
    "/api/v1/models/search": {
      "post": {
        "operationId": "models:search:alias",
        "summary": "Advanced model search",
        "responses": {"200": {"description": "Filtered model page"}}
      }
    },
    "/api/v1/models/{id}": {
      "get": {
        "operationId": "models:get",
        "summary": "Fetch one model by id",
        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
        "responses": {"200": {"description": "Model"}, "404": {"description": "Unknown model"}}
      }
    },
    "/api/v1/providers": {
      "get": {"operationId": "providers:list", "summary": "List providers", "responses": {"200": {"description": "Providers"}}}
    },
    "/api/v1/providers/{id}": {
      "get": {
        "operationId": "providers:get",
        "summary": "Fetch one provider by id",
        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
        "responses": {"200": {"description": "Provider"}, "404": {"description": "Unknown provider"}}
      }
    },
    "/api/v1/providers/{id}/models": {
      "get": {
        "operationId": "providers:models",
        "summary": "List one provider's models",
        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
        "responses": {"200": {"description": "Models"}, "404": {"description": "Unknown provider"}}
      }
    },
    "/api/v1/update": {
      "post": {"operationId": "catalog:sync", "summary": "Trigger a catalog sync", "responses": {"200": {"description": "Sync report"}}}
    },
    "/api/v1/stats": {
      "get": {"operationId": "service:stats", "summary": "Service statistics", "responses": {"200": {"description": "Stats"}}}
    },
    "/api/v1/updates/ws": {
      "get": {"operationId": "updates:websocket", "summary": "WebSocket upgrade for catalog change events", "responses": {"101": {"description": "Switching protocols"}}}
    },
    "/api/v1/updates/stream": {
      "get": {"operationId": "updates:sse", "summary": "Server-sent event stream of catalog changes", "responses": {"200": {"description": "text/event-stream"}}}
    },
    "/api/v1/health": {
      "get": {"operationId": "service:health", "summary": "Liveness probe", "responses": {"200": {"description": "Healthy"}}}
    },
    "/api/v1/ready": {
      "get": {"operationId": "service:ready", "summary": "Readiness probe", "responses": {"200": {"description": "Ready"}, "503": {"description": "Catalog not loaded"}}}
    },
    "/api/v1/metrics": {
      "get": {"operationId": "service:metrics", "summary": "Plaintext key/value metrics", "responses": {"200": {"description": "Metrics"}}}
    }
  }
}
"##;

/// YAML rendering of [`OPENAPI_JSON`], built once.
pub fn openapi_yaml() -> &'static str {
    static YAML: OnceLock<String> = OnceLock::new();
    YAML.get_or_init(|| {
        serde_json::from_str::<serde_json::Value>(OPENAPI_JSON)
            .ok()
            .and_then(|v| serde_yaml::to_string(&v).ok())
            .unwrap_or_default()
    })
}
