use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("provider not found: {0}")]
    ProviderNotFound(String),
}
