//! # encounter-ledger
//!
//! Combat-encounter ingestion service with cross-user deduplication, and
//! a module loadout optimizer with a persistent result cache.
//!
//! Several players in the same fight each upload their own view of it.
//! Every upload is fingerprinted from the facts all views share (scene,
//! bosses, start bucket, attempt count, per-player damage shares); an
//! exact fingerprint match or a fuzzy match within configured tolerances
//! resolves to the stored encounter instead of creating a new one.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, x-user-id header)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── UploadService / ModuleService / OptimizerService (service/)
//!     │
//!     ├── Fingerprinter, FuzzyMatcher, ModuleOptimizer (domain/)
//!     │
//!     └── EncounterStore / ModuleStore / OptimizationCacheStore
//!             ├── PostgreSQL (persistence/postgres)
//!             └── in-memory  (persistence/memory)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
