//! In-process store for tests and for running without a database.
//!
//! An upload transaction holds the store lock for its whole lifetime and
//! stages its writes; only [`EncounterTx::commit`] publishes them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::{CacheEntry, CachedOptimization, HashMatch, InsertOutcome, match_hashes};
use super::{EncounterStore, EncounterTx, ModuleStore, OptimizationCacheStore};
use crate::domain::{
    Encounter, EncounterHashes, Module, ModuleCategory, ModuleDraft, ModulePart, StoredEncounter,
};
use crate::error::LedgerError;

#[derive(Debug, Clone)]
struct EncounterRow {
    id: i64,
    hashes: EncounterHashes,
    encounter: Encounter,
}

impl EncounterRow {
    fn matches_exact(&self, fingerprint: &str, source_hash: Option<&str>) -> bool {
        self.hashes.fingerprint == fingerprint
            || source_hash.is_some_and(|s| self.encounter.source_hash.as_deref() == Some(s))
    }

    fn stored(&self) -> StoredEncounter {
        StoredEncounter {
            id: self.id,
            ended_at_ms: self.encounter.ended_at_ms,
            fingerprint: self.hashes.fingerprint.clone(),
            player_set_hash: self.hashes.player_set_hash.clone(),
            summary: self.encounter.summary(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    encounters: Vec<EncounterRow>,
    last_encounter_id: i64,
    uploads: HashMap<i64, i64>,
    modules: Vec<(i64, Module)>,
    last_module_id: i64,
    cache: Vec<CacheEntry>,
}

/// Shared in-memory backend implementing every store trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed encounters.
    pub async fn encounter_count(&self) -> usize {
        self.state.lock().await.encounters.len()
    }

    /// Committed upload counter of `user_id`.
    pub async fn upload_count(&self, user_id: i64) -> i64 {
        self.state
            .lock()
            .await
            .uploads
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of cache rows, expired ones included.
    pub async fn cache_len(&self) -> usize {
        self.state.lock().await.cache.len()
    }
}

/// Upload transaction over [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryEncounterTx {
    state: OwnedMutexGuard<MemoryState>,
    staged: Vec<EncounterRow>,
    uploads: Vec<(i64, i64)>,
}

impl MemoryEncounterTx {
    fn rows(&self) -> impl Iterator<Item = &EncounterRow> {
        self.state.encounters.iter().chain(self.staged.iter())
    }
}

#[async_trait]
impl EncounterStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn EncounterTx>, LedgerError> {
        let state = Arc::clone(&self.state).lock_owned().await;
        Ok(Box::new(MemoryEncounterTx {
            state,
            staged: Vec::new(),
            uploads: Vec::new(),
        }))
    }

    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<HashMatch>, LedgerError> {
        let state = self.state.lock().await;
        Ok(match_hashes(
            hashes,
            state.encounters.iter().map(|row| {
                (
                    row.id,
                    row.hashes.fingerprint.as_str(),
                    row.encounter.source_hash.as_deref(),
                )
            }),
        ))
    }
}

#[async_trait]
impl EncounterTx for MemoryEncounterTx {
    async fn find_exact(
        &mut self,
        fingerprint: &str,
        source_hash: Option<&str>,
    ) -> Result<Option<i64>, LedgerError> {
        Ok(self
            .rows()
            .find(|row| row.matches_exact(fingerprint, source_hash))
            .map(|row| row.id))
    }

    async fn find_candidates(
        &mut self,
        player_set_hash: &str,
    ) -> Result<Vec<StoredEncounter>, LedgerError> {
        Ok(self
            .rows()
            .filter(|row| row.hashes.player_set_hash == player_set_hash)
            .map(EncounterRow::stored)
            .collect())
    }

    async fn insert_encounter(
        &mut self,
        _user_id: i64,
        encounter: &Encounter,
        hashes: &EncounterHashes,
    ) -> Result<InsertOutcome, LedgerError> {
        if self
            .rows()
            .any(|row| row.hashes.fingerprint == hashes.fingerprint)
        {
            return Ok(InsertOutcome::FingerprintTaken);
        }
        self.state.last_encounter_id += 1;
        let id = self.state.last_encounter_id;
        self.staged.push(EncounterRow {
            id,
            hashes: hashes.clone(),
            encounter: encounter.clone(),
        });
        Ok(InsertOutcome::Created(id))
    }

    async fn add_uploads(&mut self, user_id: i64, count: i64) -> Result<(), LedgerError> {
        self.uploads.push((user_id, count));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let Self {
            mut state,
            staged,
            uploads,
        } = *self;
        state.encounters.extend(staged);
        for (user_id, count) in uploads {
            *state.uploads.entry(user_id).or_insert(0) += count;
        }
        Ok(())
    }
}

#[async_trait]
impl ModuleStore for MemoryStore {
    async fn list_modules(
        &self,
        user_id: i64,
        category: Option<ModuleCategory>,
    ) -> Result<Vec<Module>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .modules
            .iter()
            .filter(|(owner, m)| *owner == user_id && category.is_none_or(|c| m.category == c))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn module_parts(
        &self,
        user_id: i64,
        module_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<ModulePart>>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .modules
            .iter()
            .filter(|(owner, m)| *owner == user_id && module_ids.contains(&m.id))
            .map(|(_, m)| (m.id, m.parts.clone()))
            .collect())
    }

    async fn replace_modules(
        &self,
        user_id: i64,
        drafts: &[ModuleDraft],
    ) -> Result<usize, LedgerError> {
        let mut state = self.state.lock().await;
        let mut seen = HashSet::new();
        for draft in drafts {
            let foreign = state
                .modules
                .iter()
                .any(|(owner, m)| *owner != user_id && m.uuid == draft.uuid);
            if foreign || !seen.insert(draft.uuid) {
                return Err(LedgerError::Validation(format!(
                    "module {} is already registered",
                    draft.uuid
                )));
            }
        }

        state.modules.retain(|(owner, _)| *owner != user_id);
        state.cache.retain(|e| e.user_id != user_id);
        for draft in drafts {
            state.last_module_id += 1;
            let id = state.last_module_id;
            state.modules.push((user_id, draft.clone().into_module(id)));
        }
        Ok(drafts.len())
    }
}

#[async_trait]
impl OptimizationCacheStore for MemoryStore {
    async fn read_live(
        &self,
        user_id: i64,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedOptimization>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .cache
            .iter()
            .filter(|e| e.user_id == user_id && e.request_hash == request_hash && e.expires_at > now)
            .max_by_key(|e| e.created_at)
            .map(|e| CachedOptimization {
                combinations: e.combinations.clone(),
                processing_time_ms: e.processing_time_ms,
                created_at: e.created_at,
                expires_at: e.expires_at,
            }))
    }

    async fn write(&self, entry: CacheEntry) -> Result<(), LedgerError> {
        self.state.lock().await.cache.push(entry);
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        let before = state.cache.len();
        state.cache.retain(|e| e.expires_at > now);
        Ok(u64::try_from(before - state.cache.len()).unwrap_or(0))
    }
}
