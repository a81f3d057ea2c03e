use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use catalog::Model;

use crate::error::ApiError;
use crate::filter::{FilterResult, ModelFilter};
use crate::response::json_ok;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<Model>,
    pub pagination: Pagination,
}

fn list_response(filter: &ModelFilter, result: FilterResult) -> ModelListResponse {
    ModelListResponse {
        models: result.models.iter().map(|m| (**m).clone()).collect(),
        pagination: Pagination {
            total: result.total,
            limit: filter.limit,
            offset: filter.offset,
        },
    }
}

/// `GET /models` — filter + paginate, cached under the raw query string.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let raw = raw.unwrap_or_default();
    let fingerprint = format!("models:{raw}");

    let payload = state
        .cache
        .get_or_refresh(&fingerprint, || async {
            let filter = ModelFilter::parse_query(&raw);
            let result = filter.apply(&state.catalog.list());
            serde_json::to_value(list_response(&filter, result)).map_err(ApiError::internal)
        })
        .await?;

    Ok(json_ok(payload))
}

/// `POST /models` and `POST /models/search` — same options as the query
/// string, as a JSON body. Not cached.
pub async fn search_models(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ModelFilter>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(filter) = payload.map_err(|rejection| {
        ApiError::bad_request_with("invalid search body", rejection.body_text())
    })?;

    let result = filter.apply(&state.catalog.list());
    Ok(json_ok(list_response(&filter, result)))
}

/// `GET /models/{id}` — cached under the model id.
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let fingerprint = format!("model:{id}");

    let payload = state
        .cache
        .get_or_refresh(&fingerprint, || async {
            let model = state.catalog.find(&id)?;
            serde_json::to_value(&*model).map_err(ApiError::internal)
        })
        .await?;

    Ok(json_ok(payload))
}
