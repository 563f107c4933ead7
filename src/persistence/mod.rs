//! Persistence layer: narrow storage interfaces and their backends.
//!
//! The cores only see the traits below. [`postgres::PgStore`] implements
//! them over `sqlx::PgPool`; [`memory::MemoryStore`] keeps everything in
//! process for tests and for running with persistence disabled.
//!
//! Dropping an [`EncounterTx`] without calling [`EncounterTx::commit`]
//! rolls it back, so a cancelled request leaves no partial upload.

pub mod memory;
pub mod models;
pub mod postgres;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Encounter, EncounterHashes, Module, ModuleCategory, ModuleDraft, ModulePart, StoredEncounter};
use crate::error::LedgerError;
pub use models::{CacheEntry, CachedOptimization, HashMatch, InsertOutcome};

/// Entry point for encounter reads and upload transactions.
#[async_trait]
pub trait EncounterStore: Send + Sync + fmt::Debug {
    /// Opens an upload transaction.
    async fn begin(&self) -> Result<Box<dyn EncounterTx>, LedgerError>;

    /// Finds stored encounters whose fingerprint or source hash is in
    /// `hashes`.
    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<HashMatch>, LedgerError>;
}

/// One storage transaction spanning an upload batch.
#[async_trait]
pub trait EncounterTx: Send {
    /// Id of an encounter with this fingerprint, or with this source hash
    /// when one is given.
    async fn find_exact(
        &mut self,
        fingerprint: &str,
        source_hash: Option<&str>,
    ) -> Result<Option<i64>, LedgerError>;

    /// Every encounter sharing `player_set_hash`, with players, bosses and
    /// attempt count loaded.
    async fn find_candidates(
        &mut self,
        player_set_hash: &str,
    ) -> Result<Vec<StoredEncounter>, LedgerError>;

    /// Inserts the encounter with all nested rows.
    async fn insert_encounter(
        &mut self,
        user_id: i64,
        encounter: &Encounter,
        hashes: &EncounterHashes,
    ) -> Result<InsertOutcome, LedgerError>;

    /// Adds `count` to the user's upload counter.
    async fn add_uploads(&mut self, user_id: i64, count: i64) -> Result<(), LedgerError>;

    /// Makes every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

/// Module inventory access.
#[async_trait]
pub trait ModuleStore: Send + Sync + fmt::Debug {
    /// The user's modules in storage order, optionally of one category.
    async fn list_modules(
        &self,
        user_id: i64,
        category: Option<ModuleCategory>,
    ) -> Result<Vec<Module>, LedgerError>;

    /// Current parts of the user's modules among `module_ids`.
    async fn module_parts(
        &self,
        user_id: i64,
        module_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<ModulePart>>, LedgerError>;

    /// Replaces the user's whole inventory; returns the number stored.
    async fn replace_modules(
        &self,
        user_id: i64,
        drafts: &[ModuleDraft],
    ) -> Result<usize, LedgerError>;
}

/// Persistent optimization result cache.
#[async_trait]
pub trait OptimizationCacheStore: Send + Sync + fmt::Debug {
    /// Newest entry for the key that expires after `now`.
    async fn read_live(
        &self,
        user_id: i64,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedOptimization>, LedgerError>;

    /// Stores a result.
    async fn write(&self, entry: CacheEntry) -> Result<(), LedgerError>;

    /// Deletes entries that expired at or before `now`.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError>;
}
