//! Domain layer: scoring tables, power calculator, encounter
//! fingerprinting and fuzzy matching, and the loadout optimizer.
//!
//! Everything here is pure and storage-agnostic; the service layer feeds
//! it data loaded through the persistence traits.

pub mod cache_key;
pub mod encounter;
pub mod fingerprint;
pub mod fuzzy;
pub mod hashing;
pub mod module;
pub mod optimizer;
pub mod power;
pub mod scoring_tables;

pub use encounter::{Encounter, EncounterSummary, StoredEncounter};
pub use fingerprint::{EncounterHashes, Fingerprinter};
pub use fuzzy::{FuzzyMatcher, MatchVerdict, Similarity};
pub use module::{AttrType, Module, ModuleCategory, ModuleDraft, ModulePart};
pub use optimizer::{ModuleOptimizer, OptimizeParams, Solution, SortMode};
pub use power::{AttrBreakdown, Preferences};
