//! In-process model catalog: records, thread-safe store with change hooks,
//! provider registry and the diff-based sync engine.

pub mod error;
pub mod model;
pub mod registry;
pub mod store;
pub mod sync;

pub use error::CatalogError;
pub use model::{Features, Limits, Modalities, Modality, Model, Provider};
pub use registry::{BuiltinRegistry, ProviderRegistry, RegistrySnapshot};
pub use store::{Catalog, Upsert};
pub use sync::{RegistrySync, SyncEngine, SyncError, SyncOptions, SyncReport};
