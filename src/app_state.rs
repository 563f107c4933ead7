//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::persistence::memory::MemoryStore;
use crate::persistence::{EncounterStore, ModuleStore, OptimizationCacheStore};
use crate::service::{ModuleService, OptimizerService, UploadService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Encounter ingestion and preflight checks.
    pub upload_service: Arc<UploadService>,
    /// Module inventory.
    pub module_service: Arc<ModuleService>,
    /// Cached loadout optimization.
    pub optimizer_service: Arc<OptimizerService>,
    /// Solutions returned when a request does not say.
    pub default_solutions: usize,
}

impl AppState {
    /// Wires the services over the given stores.
    #[must_use]
    pub fn new(
        config: &LedgerConfig,
        encounters: Arc<dyn EncounterStore>,
        modules: Arc<dyn ModuleStore>,
        cache: Arc<dyn OptimizationCacheStore>,
    ) -> Self {
        Self {
            upload_service: Arc::new(UploadService::new(encounters, config.dedup, config.upload)),
            module_service: Arc::new(ModuleService::new(Arc::clone(&modules))),
            optimizer_service: Arc::new(OptimizerService::new(modules, cache, config.optimizer)),
            default_solutions: config.optimizer.default_solutions,
        }
    }

    /// Wires every service over one store implementing all three traits.
    #[must_use]
    pub fn from_store<S>(config: &LedgerConfig, store: Arc<S>) -> Self
    where
        S: EncounterStore + ModuleStore + OptimizationCacheStore + 'static,
    {
        let encounters: Arc<dyn EncounterStore> = Arc::clone(&store) as Arc<dyn EncounterStore>;
        let modules: Arc<dyn ModuleStore> = Arc::clone(&store) as Arc<dyn ModuleStore>;
        let cache: Arc<dyn OptimizationCacheStore> = store;
        Self::new(config, encounters, modules, cache)
    }

    /// State backed by a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory(config: &LedgerConfig) -> Self {
        Self::from_store(config, Arc::new(MemoryStore::new()))
    }
}
