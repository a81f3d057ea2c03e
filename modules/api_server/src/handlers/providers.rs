use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;

use catalog::{Model, Provider};

use crate::error::ApiError;
use crate::response::json_ok;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProviderListResponse {
    pub providers: Vec<Provider>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ProviderModelsResponse {
    pub provider: Provider,
    pub models: Vec<Model>,
    pub total: usize,
}

/// `GET /providers` — cached under the fixed fingerprint.
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let payload = state
        .cache
        .get_or_refresh("providers", || async {
            let providers: Vec<Provider> = state
                .catalog
                .providers()
                .iter()
                .map(|p| (**p).clone())
                .collect();
            let total = providers.len();
            serde_json::to_value(ProviderListResponse { providers, total })
                .map_err(ApiError::internal)
        })
        .await?;

    Ok(json_ok(payload))
}

/// `GET /providers/{id}` — cached under the provider id.
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let fingerprint = format!("provider:{id}");

    let payload = state
        .cache
        .get_or_refresh(&fingerprint, || async {
            let provider = state.catalog.provider(&id)?;
            serde_json::to_value(&*provider).map_err(ApiError::internal)
        })
        .await?;

    Ok(json_ok(payload))
}

/// `GET /providers/{id}/models` — uncached, reads the live snapshot.
pub async fn provider_models(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let provider = state.catalog.provider(&id)?;
    let models: Vec<Model> = state
        .catalog
        .provider_models(&id)?
        .iter()
        .map(|m| (**m).clone())
        .collect();
    let total = models.len();

    Ok(json_ok(ProviderModelsResponse {
        provider: (*provider).clone(),
        models,
        total,
    }))
}
