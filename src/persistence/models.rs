//! Storage-facing records shared by the backends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of inserting an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Created(i64),
    /// Another writer already owns the fingerprint; nothing was written.
    FingerprintTaken,
}

/// A stored encounter matched by a preflight hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMatch {
    /// The hash as asked.
    pub hash: String,
    /// Matching encounter.
    pub encounter_id: i64,
}

/// A live cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOptimization {
    /// Serialized solutions.
    pub combinations: serde_json::Value,
    /// Time the original computation took.
    pub processing_time_ms: i64,
    /// Write time.
    pub created_at: DateTime<Utc>,
    /// Entry is ignored from this instant on.
    pub expires_at: DateTime<Utc>,
}

/// A cache row to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Owner.
    pub user_id: i64,
    /// Truncated request digest.
    pub request_hash: String,
    /// Serialized solutions.
    pub combinations: serde_json::Value,
    /// Time the computation took.
    pub processing_time_ms: i64,
    /// Write time.
    pub created_at: DateTime<Utc>,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Pairs each asked hash with the first encounter carrying it.
pub(crate) fn match_hashes<'a, I>(hashes: &[String], rows: I) -> Vec<HashMatch>
where
    I: IntoIterator<Item = (i64, &'a str, Option<&'a str>)>,
{
    let mut found: HashMap<&str, i64> = HashMap::new();
    for (id, fingerprint, source_hash) in rows {
        found.entry(fingerprint).or_insert(id);
        if let Some(source) = source_hash {
            found.entry(source).or_insert(id);
        }
    }
    hashes
        .iter()
        .filter_map(|hash| {
            found.get(hash.as_str()).map(|id| HashMatch {
                hash: hash.clone(),
                encounter_id: *id,
            })
        })
        .collect()
}
