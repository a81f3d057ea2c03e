use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ProviderRegistry;
use crate::store::{Catalog, Upsert};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Compute the diff without applying it.
    pub dry_run: bool,
    /// Restrict the sync to these provider ids. Empty means all.
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncReport {
    pub total_changes: usize,
    pub providers_changed: usize,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("registry unavailable: {0}")]
    Registry(String),
    #[error("sync already in progress")]
    Busy,
}

#[async_trait]
pub trait SyncEngine: Send + Sync {
    async fn sync(&self, opts: SyncOptions) -> Result<SyncReport, SyncError>;
}

/// Diffs a registry snapshot against the catalog and applies the result
/// through the catalog mutators, so change hooks fire per model.
pub struct RegistrySync {
    registry: Arc<dyn ProviderRegistry>,
    catalog: Arc<Catalog>,
    running: AtomicBool,
}

impl RegistrySync {
    pub fn new(registry: Arc<dyn ProviderRegistry>, catalog: Arc<Catalog>) -> Self {
        Self {
            registry,
            catalog,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SyncEngine for RegistrySync {
    async fn sync(&self, opts: SyncOptions) -> Result<SyncReport, SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::Busy);
        }
        let result = self.sync_inner(&opts);
        self.running.store(false, Ordering::SeqCst);
        result
    }
}

impl RegistrySync {
    fn sync_inner(&self, opts: &SyncOptions) -> Result<SyncReport, SyncError> {
        let snapshot = self.registry.snapshot();
        let selected = |provider: &str| -> bool {
            opts.providers.is_empty() || opts.providers.iter().any(|p| p == provider)
        };

        let mut total_changes = 0usize;
        let mut providers_changed: BTreeSet<String> = BTreeSet::new();

        // Providers first so model upserts always reference a known one.
        for provider in snapshot
            .providers
            .iter()
            .filter(|p| selected(&p.id))
            .cloned()
        {
            let id = provider.id.clone();
            if opts.dry_run {
                let differs = self.catalog.provider(&id).map(|old| *old != provider);
                if differs.unwrap_or(true) {
                    providers_changed.insert(id);
                }
            } else if self.catalog.upsert_provider(provider) {
                providers_changed.insert(id);
            }
        }

        let incoming: BTreeSet<&str> = snapshot
            .models
            .iter()
            .filter(|m| selected(&m.provider))
            .map(|m| m.id.as_str())
            .collect();

        // Models no longer present upstream are removed.
        let stale: Vec<String> = self
            .catalog
            .list()
            .into_iter()
            .filter(|m| selected(&m.provider) && !incoming.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect();
        for id in stale {
            total_changes += 1;
            if !opts.dry_run {
                self.catalog.remove_model(&id);
            }
        }

        for model in snapshot.models.into_iter().filter(|m| selected(&m.provider)) {
            if opts.dry_run {
                let differs = self.catalog.find(&model.id).map(|old| *old != model);
                if differs.unwrap_or(true) {
                    total_changes += 1;
                    providers_changed.insert(model.provider.clone());
                }
            } else {
                let provider = model.provider.clone();
                match self.catalog.upsert_model(model) {
                    Upsert::Added | Upsert::Updated => {
                        total_changes += 1;
                        providers_changed.insert(provider);
                    }
                    Upsert::Unchanged => {}
                }
            }
        }

        tracing::info!(
            total_changes,
            providers_changed = providers_changed.len(),
            dry_run = opts.dry_run,
            "catalog sync finished"
        );

        Ok(SyncReport {
            total_changes,
            providers_changed: providers_changed.len(),
            dry_run: opts.dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, Provider};
    use crate::registry::RegistrySnapshot;

    struct FixedRegistry(RegistrySnapshot);

    impl ProviderRegistry for FixedRegistry {
        fn snapshot(&self) -> RegistrySnapshot {
            self.0.clone()
        }
    }

    fn model(id: &str, provider: &str) -> Model {
        Model {
            id: id.to_string(),
            name: id.to_string(),
            provider: provider.to_string(),
            description: None,
            modalities: Default::default(),
            features: Default::default(),
            tags: vec![],
            open_weights: false,
            limits: Default::default(),
            released_at: None,
        }
    }

    fn provider(id: &str) -> Provider {
        Provider {
            id: id.to_string(),
            name: id.to_string(),
            homepage: None,
        }
    }

    fn engine(snapshot: RegistrySnapshot, catalog: Arc<Catalog>) -> RegistrySync {
        RegistrySync::new(Arc::new(FixedRegistry(snapshot)), catalog)
    }

    #[tokio::test]
    async fn first_sync_adds_everything() {
        let catalog = Arc::new(Catalog::new());
        let snap = RegistrySnapshot {
            providers: vec![provider("acme")],
            models: vec![model("a", "acme"), model("b", "acme")],
        };
        let report = engine(snap, catalog.clone())
            .sync(SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.total_changes, 2);
        assert_eq!(report.providers_changed, 1);
        assert!(!report.dry_run);
        assert_eq!(catalog.model_count(), 2);
    }

    #[tokio::test]
    async fn second_sync_is_a_no_op() {
        let catalog = Arc::new(Catalog::new());
        let snap = RegistrySnapshot {
            providers: vec![provider("acme")],
            models: vec![model("a", "acme")],
        };
        let eng = engine(snap, catalog.clone());
        eng.sync(SyncOptions::default()).await.unwrap();
        let report = eng.sync(SyncOptions::default()).await.unwrap();
        assert_eq!(report.total_changes, 0);
        assert_eq!(report.providers_changed, 0);
    }

    #[tokio::test]
    async fn removed_upstream_models_are_dropped() {
        let catalog = Arc::new(Catalog::new());
        catalog.upsert_provider(provider("acme"));
        catalog.upsert_model(model("gone", "acme"));

        let snap = RegistrySnapshot {
            providers: vec![provider("acme")],
            models: vec![model("kept", "acme")],
        };
        let report = engine(snap, catalog.clone())
            .sync(SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(report.total_changes, 2); // one removal, one addition
        assert!(catalog.find("gone").is_err());
        assert!(catalog.find("kept").is_ok());
    }

    #[tokio::test]
    async fn dry_run_reports_without_applying() {
        let catalog = Arc::new(Catalog::new());
        let snap = RegistrySnapshot {
            providers: vec![provider("acme")],
            models: vec![model("a", "acme")],
        };
        let report = engine(snap, catalog.clone())
            .sync(SyncOptions {
                dry_run: true,
                providers: vec![],
            })
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.total_changes, 1);
        assert_eq!(catalog.model_count(), 0);
    }

    #[tokio::test]
    async fn provider_scope_limits_the_diff() {
        let catalog = Arc::new(Catalog::new());
        let snap = RegistrySnapshot {
            providers: vec![provider("acme"), provider("zen")],
            models: vec![model("a", "acme"), model("z", "zen")],
        };
        let report = engine(snap, catalog.clone())
            .sync(SyncOptions {
                dry_run: false,
                providers: vec!["zen".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(report.total_changes, 1);
        assert!(catalog.find("z").is_ok());
        assert!(catalog.find("a").is_err());
    }
}
