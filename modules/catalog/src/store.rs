use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CatalogError;
use crate::model::{Model, Provider};

pub type AddedHook = Box<dyn Fn(&Model) + Send + Sync>;
pub type UpdatedHook = Box<dyn Fn(&Model, &Model) + Send + Sync>;
pub type RemovedHook = Box<dyn Fn(&Model) + Send + Sync>;

/// Outcome of `upsert_model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Updated,
    Unchanged,
}

/// Thread-safe model/provider store.
///
/// Change hooks run synchronously on the mutator's task, after the internal
/// locks have been released. Hook bodies must be non-blocking: the server
/// installs hooks that only enqueue an event on the broker.
pub struct Catalog {
    models: RwLock<BTreeMap<String, Arc<Model>>>,
    providers: RwLock<BTreeMap<String, Arc<Provider>>>,
    added_hooks: RwLock<Vec<AddedHook>>,
    updated_hooks: RwLock<Vec<UpdatedHook>>,
    removed_hooks: RwLock<Vec<RemovedHook>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(BTreeMap::new()),
            providers: RwLock::new(BTreeMap::new()),
            added_hooks: RwLock::new(Vec::new()),
            updated_hooks: RwLock::new(Vec::new()),
            removed_hooks: RwLock::new(Vec::new()),
        }
    }

    /// Seed the store without firing hooks. Used at startup, before any
    /// hooks are installed.
    pub fn with_seed(models: Vec<Model>, providers: Vec<Provider>) -> Self {
        let cat = Self::new();
        {
            let mut m = cat.models.write();
            for model in models {
                m.insert(model.id.clone(), Arc::new(model));
            }
            let mut p = cat.providers.write();
            for provider in providers {
                p.insert(provider.id.clone(), Arc::new(provider));
            }
        }
        cat
    }

    // ----- read surface ------------------------------------------------

    /// Finite snapshot of all models, ordered by id.
    pub fn list(&self) -> Vec<Arc<Model>> {
        self.models.read().values().cloned().collect()
    }

    pub fn find(&self, id: &str) -> Result<Arc<Model>, CatalogError> {
        self.models
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::ModelNotFound(id.to_string()))
    }

    pub fn providers(&self) -> Vec<Arc<Provider>> {
        self.providers.read().values().cloned().collect()
    }

    pub fn provider(&self, id: &str) -> Result<Arc<Provider>, CatalogError> {
        self.providers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::ProviderNotFound(id.to_string()))
    }

    /// Models belonging to one provider. Errors if the provider is unknown.
    pub fn provider_models(&self, id: &str) -> Result<Vec<Arc<Model>>, CatalogError> {
        self.provider(id)?;
        Ok(self
            .models
            .read()
            .values()
            .filter(|m| m.provider == id)
            .cloned()
            .collect())
    }

    pub fn model_count(&self) -> usize {
        self.models.read().len()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().len()
    }

    // ----- hooks -------------------------------------------------------

    pub fn on_model_added(&self, f: AddedHook) {
        self.added_hooks.write().push(f);
    }

    pub fn on_model_updated(&self, f: UpdatedHook) {
        self.updated_hooks.write().push(f);
    }

    pub fn on_model_removed(&self, f: RemovedHook) {
        self.removed_hooks.write().push(f);
    }

    // ----- mutators ----------------------------------------------------

    /// Insert or replace a model. Fires the added/updated hook after the
    /// write lock is released; identical replacements fire nothing.
    pub fn upsert_model(&self, model: Model) -> Upsert {
        let model = Arc::new(model);
        let previous = {
            let mut models = self.models.write();
            models.insert(model.id.clone(), model.clone())
        };

        match previous {
            None => {
                for hook in self.added_hooks.read().iter() {
                    hook(&model);
                }
                Upsert::Added
            }
            Some(old) if *old != *model => {
                for hook in self.updated_hooks.read().iter() {
                    hook(&old, &model);
                }
                Upsert::Updated
            }
            Some(_) => Upsert::Unchanged,
        }
    }

    /// Remove a model by id. Fires the removed hook when something was
    /// actually removed.
    pub fn remove_model(&self, id: &str) -> bool {
        let removed = { self.models.write().remove(id) };
        match removed {
            Some(old) => {
                for hook in self.removed_hooks.read().iter() {
                    hook(&old);
                }
                true
            }
            None => false,
        }
    }

    /// Insert or replace a provider. Returns true when the stored value
    /// changed.
    pub fn upsert_provider(&self, provider: Provider) -> bool {
        let provider = Arc::new(provider);
        let mut providers = self.providers.write();
        match providers.insert(provider.id.clone(), provider.clone()) {
            None => true,
            Some(old) => *old != *provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn model(id: &str) -> Model {
        Model {
            id: id.to_string(),
            name: id.to_uppercase(),
            provider: "acme".to_string(),
            description: None,
            modalities: Default::default(),
            features: Default::default(),
            tags: vec![],
            open_weights: false,
            limits: Default::default(),
            released_at: None,
        }
    }

    #[test]
    fn find_unknown_is_not_found() {
        let cat = Catalog::new();
        assert!(matches!(
            cat.find("nope"),
            Err(CatalogError::ModelNotFound(_))
        ));
    }

    #[test]
    fn upsert_fires_added_then_updated() {
        let cat = Catalog::new();
        let added = Arc::new(AtomicUsize::new(0));
        let updated = Arc::new(AtomicUsize::new(0));
        let (a, u) = (added.clone(), updated.clone());
        cat.on_model_added(Box::new(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        }));
        cat.on_model_updated(Box::new(move |_, _| {
            u.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(cat.upsert_model(model("m1")), Upsert::Added);
        // Identical replacement is a no-op for hooks.
        assert_eq!(cat.upsert_model(model("m1")), Upsert::Unchanged);
        let mut changed = model("m1");
        changed.name = "renamed".to_string();
        assert_eq!(cat.upsert_model(changed), Upsert::Updated);

        assert_eq!(added.load(Ordering::SeqCst), 1);
        assert_eq!(updated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_fires_hook_once() {
        let cat = Catalog::new();
        let removed = Arc::new(AtomicUsize::new(0));
        let r = removed.clone();
        cat.on_model_removed(Box::new(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }));

        cat.upsert_model(model("m1"));
        assert!(cat.remove_model("m1"));
        assert!(!cat.remove_model("m1"));
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn provider_models_requires_known_provider() {
        let cat = Catalog::new();
        cat.upsert_provider(Provider {
            id: "acme".to_string(),
            name: "Acme".to_string(),
            homepage: None,
        });
        cat.upsert_model(model("m1"));
        cat.upsert_model(model("m2"));

        let models = cat.provider_models("acme").unwrap();
        assert_eq!(models.len(), 2);
        assert!(matches!(
            cat.provider_models("ghost"),
            Err(CatalogError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn reading_the_store_inside_a_hook_does_not_deadlock() {
        // Hooks run after the write lock is released, so a hook may read
        // the store it was called from.
        let cat = Arc::new(Catalog::new());
        let inner = cat.clone();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        cat.on_model_added(Box::new(move |_| {
            s.store(inner.model_count(), Ordering::SeqCst);
        }));
        cat.upsert_model(model("m1"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
