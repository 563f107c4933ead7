//! Optimizer service: cached loadout optimization.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OptimizerConfig;
use crate::domain::cache_key;
use crate::domain::{Module, ModuleCategory, ModuleOptimizer, ModulePart, OptimizeParams, Solution};
use crate::error::LedgerError;
use crate::persistence::{CacheEntry, ModuleStore, OptimizationCacheStore};

/// Name reported in response metadata.
pub const ALGORITHM: &str = "greedy+local_search";

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeMetadata {
    /// Modules of the requested category the user owns.
    pub total_modules: usize,
    /// Wall time spent serving this request.
    pub processing_time_ms: u64,
    /// Search algorithm.
    pub algorithm: &'static str,
    /// Whether the solutions came from the cache.
    pub cache_hit: bool,
}

/// Solutions plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeOutcome {
    /// Ranked solutions.
    pub solutions: Vec<Solution>,
    /// Response metadata.
    pub metadata: OptimizeMetadata,
}

/// Module reference as cached; attributes are re-read on every hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedModule {
    id: i64,
    uuid: Uuid,
    name: String,
    config_id: i32,
    quality: u8,
    category: ModuleCategory,
}

impl CachedModule {
    fn from_module(module: &Module) -> Self {
        Self {
            id: module.id,
            uuid: module.uuid,
            name: module.name.clone(),
            config_id: module.config_id,
            quality: module.quality,
            category: module.category,
        }
    }

    fn into_module(self, parts: Vec<ModulePart>) -> Module {
        Module {
            id: self.id,
            uuid: self.uuid,
            name: self.name,
            config_id: self.config_id,
            quality: self.quality,
            category: self.category,
            parts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSolution {
    modules: Vec<CachedModule>,
    attr_breakdown: BTreeMap<String, i32>,
    score: f64,
    priority_level: u8,
    total_attr_value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedPayload {
    total_modules: usize,
    solutions: Vec<CachedSolution>,
}

impl CachedPayload {
    fn new(total_modules: usize, solutions: &[Solution]) -> Self {
        Self {
            total_modules,
            solutions: solutions
                .iter()
                .map(|s| CachedSolution {
                    modules: s.modules.iter().map(CachedModule::from_module).collect(),
                    attr_breakdown: s.attr_breakdown.clone(),
                    score: s.score,
                    priority_level: s.priority_level,
                    total_attr_value: s.total_attr_value,
                })
                .collect(),
        }
    }
}

enum CacheLookup {
    Hit(CachedPayload),
    Miss,
}

/// Runs the optimizer over the caller's inventory behind a persistent
/// result cache keyed by [`cache_key::request_hash`].
#[derive(Debug, Clone)]
pub struct OptimizerService {
    modules: Arc<dyn ModuleStore>,
    cache: Arc<dyn OptimizationCacheStore>,
    optimizer: ModuleOptimizer,
    cache_ttl: Duration,
}

impl OptimizerService {
    /// Creates a new `OptimizerService`.
    #[must_use]
    pub fn new(
        modules: Arc<dyn ModuleStore>,
        cache: Arc<dyn OptimizationCacheStore>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            modules,
            cache,
            optimizer: ModuleOptimizer::new(config),
            cache_ttl: Duration::seconds(config.cache_ttl_secs.max(0)),
        }
    }

    /// Returns the best loadouts for `user_id`, from cache when a live
    /// entry exists.
    ///
    /// A fresh result is written to the cache by a detached task after
    /// this call returns; a failed write is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for out-of-range parameters,
    /// [`LedgerError::InsufficientModules`] when fewer than four modules
    /// qualify, and [`LedgerError::Storage`] when modules cannot be read.
    pub async fn optimize(
        &self,
        user_id: i64,
        params: OptimizeParams,
    ) -> Result<OptimizeOutcome, LedgerError> {
        let started = Instant::now();
        let params = OptimizeParams {
            preferences: params.preferences.normalized(),
            ..params
        };
        self.optimizer.validate(&params)?;
        let request_hash = cache_key::request_hash(user_id, &params);

        if let CacheLookup::Hit(payload) = self.lookup(user_id, &request_hash).await
            && let Some(solutions) = self.hydrate(user_id, payload.solutions).await?
        {
            let metadata = OptimizeMetadata {
                total_modules: payload.total_modules,
                processing_time_ms: elapsed_ms(started),
                algorithm: ALGORITHM,
                cache_hit: true,
            };
            tracing::info!(
                user_id,
                %request_hash,
                solutions = solutions.len(),
                "optimization served from cache"
            );
            return Ok(OptimizeOutcome {
                solutions,
                metadata,
            });
        }

        let modules = self
            .modules
            .list_modules(user_id, Some(params.category))
            .await?;
        let total_modules = modules.len();
        let optimizer = self.optimizer;
        let search = params.clone();
        let solutions = tokio::task::spawn_blocking(move || optimizer.optimize(&modules, &search))
            .await
            .map_err(|e| LedgerError::Internal(format!("optimizer task failed: {e}")))??;

        let processing_time_ms = elapsed_ms(started);
        self.store_detached(user_id, request_hash, total_modules, &solutions, processing_time_ms);

        tracing::info!(
            user_id,
            category = %params.category,
            total_modules,
            solutions = solutions.len(),
            processing_time_ms,
            "optimization computed"
        );
        Ok(OptimizeOutcome {
            solutions,
            metadata: OptimizeMetadata {
                total_modules,
                processing_time_ms,
                algorithm: ALGORITHM,
                cache_hit: false,
            },
        })
    }

    /// Deletes expired cache entries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the delete fails.
    pub async fn prune_expired(&self) -> Result<u64, LedgerError> {
        self.cache.prune_expired(Utc::now()).await
    }

    async fn lookup(&self, user_id: i64, request_hash: &str) -> CacheLookup {
        let entry = match self.cache.read_live(user_id, request_hash, Utc::now()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return CacheLookup::Miss,
            Err(err) => {
                tracing::warn!(error = ?err, %request_hash, "cache read failed");
                return CacheLookup::Miss;
            }
        };
        match serde_json::from_value::<CachedPayload>(entry.combinations) {
            Ok(payload) => CacheLookup::Hit(payload),
            Err(err) => {
                tracing::warn!(error = %err, %request_hash, "cached optimization does not decode");
                CacheLookup::Miss
            }
        }
    }

    /// Re-attaches current attributes to cached module references.
    /// `None` when any referenced module is no longer owned by `user_id`.
    async fn hydrate(
        &self,
        user_id: i64,
        cached: Vec<CachedSolution>,
    ) -> Result<Option<Vec<Solution>>, LedgerError> {
        let mut ids: Vec<i64> = cached
            .iter()
            .flat_map(|s| s.modules.iter().map(|m| m.id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        let parts: HashMap<i64, Vec<ModulePart>> =
            self.modules.module_parts(user_id, &ids).await?;

        let mut solutions = Vec::with_capacity(cached.len());
        for s in cached {
            let mut modules = Vec::with_capacity(s.modules.len());
            for m in s.modules {
                let Some(attrs) = parts.get(&m.id) else {
                    tracing::info!(
                        user_id,
                        module_id = m.id,
                        "cached optimization references a module no longer owned"
                    );
                    return Ok(None);
                };
                modules.push(m.into_module(attrs.clone()));
            }
            solutions.push(Solution {
                modules,
                attr_breakdown: s.attr_breakdown,
                score: s.score,
                priority_level: s.priority_level,
                total_attr_value: s.total_attr_value,
            });
        }
        Ok(Some(solutions))
    }

    fn store_detached(
        &self,
        user_id: i64,
        request_hash: String,
        total_modules: usize,
        solutions: &[Solution],
        processing_time_ms: u64,
    ) {
        let combinations = match serde_json::to_value(CachedPayload::new(total_modules, solutions)) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "optimization result is not serializable");
                return;
            }
        };
        let created_at = Utc::now();
        let entry = CacheEntry {
            user_id,
            request_hash,
            combinations,
            processing_time_ms: i64::try_from(processing_time_ms).unwrap_or(i64::MAX),
            created_at,
            expires_at: created_at + self.cache_ttl,
        };
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let request_hash = entry.request_hash.clone();
            if let Err(err) = cache.write(entry).await {
                tracing::error!(error = ?err, %request_hash, "cache write failed");
            }
        });
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::power::{self, AttrBreakdown, Preferences};
    use crate::domain::{AttrType, ModuleDraft, SortMode};
    use crate::persistence::memory::MemoryStore;

    fn draft(name: &str, category: ModuleCategory, parts: &[(&str, i32)]) -> ModuleDraft {
        ModuleDraft {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            config_id: 5_500_101,
            quality: 4,
            category,
            parts: parts
                .iter()
                .enumerate()
                .map(|(i, (attr, value))| ModulePart {
                    part_id: i32::try_from(i).unwrap_or(0),
                    name: (*attr).to_string(),
                    value: *value,
                    attr_type: AttrType::Basic,
                })
                .collect(),
        }
    }

    fn params(category: ModuleCategory) -> OptimizeParams {
        OptimizeParams {
            category,
            preferences: Preferences::default(),
            max_solutions: 20,
            sort_mode: SortMode::ByScore,
        }
    }

    async fn seeded(drafts: &[ModuleDraft]) -> (MemoryStore, OptimizerService) {
        let store = MemoryStore::new();
        tokio_test::assert_ok!(store.replace_modules(1, drafts).await);
        let svc = OptimizerService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            OptimizerConfig::default(),
        );
        (store, svc)
    }

    async fn wait_for_cache(store: &MemoryStore, rows: usize) {
        for _ in 0..100 {
            if store.cache_len().await >= rows {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("cache write did not land");
    }

    fn four_attack() -> Vec<ModuleDraft> {
        vec![
            draft("a", ModuleCategory::Attack, &[("Crit Focus", 5), ("Armor", 2)]),
            draft("b", ModuleCategory::Attack, &[("Crit Focus", 4)]),
            draft("c", ModuleCategory::Attack, &[("Agile", 6)]),
            draft("d", ModuleCategory::Attack, &[("Strength Boost", 7)]),
            draft("e", ModuleCategory::Defense, &[("Armor", 9)]),
        ]
    }

    #[tokio::test]
    async fn four_modules_yield_one_solution() {
        let (_store, svc) = seeded(&four_attack()).await;
        let Ok(outcome) = svc.optimize(1, params(ModuleCategory::Attack)).await else {
            panic!("optimize");
        };
        assert_eq!(outcome.solutions.len(), 1);
        assert_eq!(outcome.metadata.total_modules, 4);
        assert!(!outcome.metadata.cache_hit);
        assert_eq!(outcome.metadata.algorithm, "greedy+local_search");

        let Some(best) = outcome.solutions.first() else {
            panic!("one solution");
        };
        let mut names: Vec<&str> = best.modules.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        let expected = power::score(
            &AttrBreakdown::from_modules(&best.modules),
            &Preferences::default(),
        );
        assert_eq!(best.score.to_bits(), expected.to_bits());
    }

    #[tokio::test]
    async fn second_call_hits_the_cache() {
        let (store, svc) = seeded(&four_attack()).await;
        let Ok(first) = svc.optimize(1, params(ModuleCategory::Attack)).await else {
            panic!("first optimize");
        };
        wait_for_cache(&store, 1).await;
        let Ok(second) = svc.optimize(1, params(ModuleCategory::Attack)).await else {
            panic!("second optimize");
        };
        assert!(second.metadata.cache_hit);
        assert_eq!(second.metadata.total_modules, first.metadata.total_modules);
        assert_eq!(second.solutions, first.solutions);
    }

    fn owned_ids(store_modules: &[Module]) -> Vec<i64> {
        store_modules.iter().map(|m| m.id).collect()
    }

    #[tokio::test]
    async fn replaced_inventory_is_recomputed() {
        let (store, svc) = seeded(&four_attack()).await;
        tokio_test::assert_ok!(svc.optimize(1, params(ModuleCategory::Attack)).await);
        wait_for_cache(&store, 1).await;

        let fresh: Vec<ModuleDraft> = ["w", "x", "y", "z"]
            .iter()
            .map(|name| draft(name, ModuleCategory::Attack, &[("Crit Focus", 3)]))
            .collect();
        tokio_test::assert_ok!(store.replace_modules(1, &fresh).await);
        assert_eq!(store.cache_len().await, 0);

        let Ok(owned) = store.list_modules(1, Some(ModuleCategory::Attack)).await else {
            panic!("list");
        };
        let owned = owned_ids(&owned);
        let Ok(outcome) = svc.optimize(1, params(ModuleCategory::Attack)).await else {
            panic!("optimize");
        };
        assert!(!outcome.metadata.cache_hit);
        assert!(
            outcome
                .solutions
                .iter()
                .flat_map(|s| &s.modules)
                .all(|m| owned.contains(&m.id))
        );
    }

    #[tokio::test]
    async fn stale_entry_written_after_replace_is_a_miss() {
        let (store, svc) = seeded(&four_attack()).await;
        let p = params(ModuleCategory::Attack);
        let Ok(first) = svc.optimize(1, p.clone()).await else {
            panic!("optimize");
        };
        wait_for_cache(&store, 1).await;
        let Ok(Some(entry)) = store
            .read_live(1, &cache_key::request_hash(1, &p), Utc::now())
            .await
        else {
            panic!("live entry expected");
        };

        let fresh: Vec<ModuleDraft> = ["w", "x", "y", "z"]
            .iter()
            .map(|name| draft(name, ModuleCategory::Attack, &[("Armor", 4)]))
            .collect();
        tokio_test::assert_ok!(store.replace_modules(1, &fresh).await);
        // A detached write from before the replace can still land afterwards.
        let now = Utc::now();
        tokio_test::assert_ok!(
            store
                .write(CacheEntry {
                    user_id: 1,
                    request_hash: cache_key::request_hash(1, &p),
                    combinations: entry.combinations,
                    processing_time_ms: entry.processing_time_ms,
                    created_at: now,
                    expires_at: now + Duration::hours(1),
                })
                .await
        );

        let Ok(outcome) = svc.optimize(1, p).await else {
            panic!("optimize");
        };
        assert!(!outcome.metadata.cache_hit);
        let stale: Vec<i64> = first
            .solutions
            .iter()
            .flat_map(|s| s.modules.iter().map(|m| m.id))
            .collect();
        assert!(
            outcome
                .solutions
                .iter()
                .flat_map(|s| &s.modules)
                .all(|m| !stale.contains(&m.id) && m.parts.len() == 1)
        );
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let (store, svc) = seeded(&four_attack()).await;
        let p = params(ModuleCategory::Attack);
        let now = Utc::now();
        tokio_test::assert_ok!(
            store
                .write(CacheEntry {
                    user_id: 1,
                    request_hash: cache_key::request_hash(1, &p),
                    combinations: json!({"unexpected": true}),
                    processing_time_ms: 1,
                    created_at: now,
                    expires_at: now + Duration::hours(1),
                })
                .await
        );
        let Ok(outcome) = svc.optimize(1, p).await else {
            panic!("optimize");
        };
        assert!(!outcome.metadata.cache_hit);
        assert_eq!(outcome.solutions.len(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_never_hits() {
        let store = MemoryStore::new();
        tokio_test::assert_ok!(store.replace_modules(1, &four_attack()).await);
        let config = OptimizerConfig {
            cache_ttl_secs: 0,
            ..OptimizerConfig::default()
        };
        let svc = OptimizerService::new(Arc::new(store.clone()), Arc::new(store.clone()), config);
        tokio_test::assert_ok!(svc.optimize(1, params(ModuleCategory::Attack)).await);
        wait_for_cache(&store, 1).await;
        let Ok(again) = svc.optimize(1, params(ModuleCategory::Attack)).await else {
            panic!("optimize");
        };
        assert!(!again.metadata.cache_hit);
        assert!(matches!(svc.prune_expired().await, Ok(n) if n >= 1));
    }

    #[tokio::test]
    async fn exclusion_can_leave_too_few_modules() {
        let (_store, svc) = seeded(&four_attack()).await;
        let mut p = params(ModuleCategory::Attack);
        p.preferences.excluded_attributes = vec!["Agile".into()];
        let result = svc.optimize(1, p).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientModules {
                required: 4,
                available: 3
            })
        ));
    }

    #[tokio::test]
    async fn other_users_modules_are_invisible() {
        let (_store, svc) = seeded(&four_attack()).await;
        let result = svc.optimize(2, params(ModuleCategory::Attack)).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientModules { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn out_of_range_max_solutions_is_rejected() {
        let (_store, svc) = seeded(&four_attack()).await;
        let mut p = params(ModuleCategory::Attack);
        p.max_solutions = 61;
        assert!(matches!(svc.optimize(1, p).await, Err(LedgerError::Validation(_))));
    }
}
