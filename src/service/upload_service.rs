//! Upload service: the transactional deduplication pipeline.

use std::sync::Arc;

use crate::config::{DedupConfig, UploadConfig};
use crate::domain::{Encounter, EncounterHashes, EncounterSummary, Fingerprinter, FuzzyMatcher};
use crate::error::LedgerError;
use crate::persistence::{EncounterStore, EncounterTx, HashMatch, InsertOutcome};

/// Outcome of an upload batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows newly created by this batch.
    pub ingested: usize,
    /// Stored id per input encounter, in input order.
    pub ids: Vec<i64>,
}

/// Outcome of a preflight hash check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Hashes already known, with the encounter carrying them.
    pub duplicates: Vec<HashMatch>,
    /// Hashes no stored encounter carries.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Exact(i64),
    Fuzzy(i64),
    Raced(i64),
    Created(i64),
}

impl Resolution {
    const fn id(self) -> i64 {
        match self {
            Self::Exact(id) | Self::Fuzzy(id) | Self::Raced(id) | Self::Created(id) => id,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Exact(_) => "exact",
            Self::Fuzzy(_) => "fuzzy",
            Self::Raced(_) => "raced",
            Self::Created(_) => "created",
        }
    }
}

/// Ingests encounter batches, collapsing duplicates onto stored rows.
///
/// Each batch runs in one storage transaction: every encounter is first
/// looked up by fingerprint or source hash, then fuzzily against stored
/// encounters with the same player set, and only inserted when neither
/// finds a match. Any failure rolls the whole batch back.
#[derive(Debug, Clone)]
pub struct UploadService {
    store: Arc<dyn EncounterStore>,
    fingerprinter: Fingerprinter,
    matcher: FuzzyMatcher,
    limits: UploadConfig,
}

impl UploadService {
    /// Creates a new `UploadService`.
    #[must_use]
    pub fn new(store: Arc<dyn EncounterStore>, dedup: DedupConfig, limits: UploadConfig) -> Self {
        Self {
            store,
            fingerprinter: Fingerprinter::new(dedup.bucket_secs),
            matcher: FuzzyMatcher::new(dedup),
            limits,
        }
    }

    /// Ingests `encounters` on behalf of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for an empty or oversized batch
    /// or an invalid encounter, and [`LedgerError::Storage`] if any
    /// storage step fails; nothing is persisted in either case.
    pub async fn ingest(
        &self,
        user_id: i64,
        encounters: &[Encounter],
    ) -> Result<IngestReport, LedgerError> {
        if encounters.is_empty() {
            return Err(LedgerError::Validation(
                "encounters must not be empty".to_string(),
            ));
        }
        if encounters.len() > self.limits.max_batch {
            return Err(LedgerError::Validation(format!(
                "at most {} encounters per upload",
                self.limits.max_batch
            )));
        }
        for (idx, encounter) in encounters.iter().enumerate() {
            encounter.validate().map_err(|e| match e {
                LedgerError::Validation(msg) => {
                    LedgerError::Validation(format!("encounters[{idx}]: {msg}"))
                }
                other => other,
            })?;
        }

        let mut tx = self.store.begin().await?;
        let mut ids = Vec::with_capacity(encounters.len());
        let mut ingested = 0_usize;

        for encounter in encounters {
            let summary = encounter.summary();
            let hashes = self.fingerprinter.hashes(&summary);
            let resolution = self
                .resolve(tx.as_mut(), user_id, encounter, &summary, &hashes)
                .await?;
            tracing::debug!(
                user_id,
                fingerprint = %hashes.fingerprint,
                decision = resolution.as_str(),
                encounter_id = resolution.id(),
                "encounter resolved"
            );
            if matches!(resolution, Resolution::Created(_)) {
                ingested += 1;
            }
            ids.push(resolution.id());
        }

        if ingested > 0 {
            tx.add_uploads(user_id, i64::try_from(ingested).unwrap_or(i64::MAX))
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            user_id,
            received = encounters.len(),
            ingested,
            "upload batch committed"
        );
        Ok(IngestReport { ingested, ids })
    }

    async fn resolve(
        &self,
        tx: &mut dyn EncounterTx,
        user_id: i64,
        encounter: &Encounter,
        summary: &EncounterSummary,
        hashes: &EncounterHashes,
    ) -> Result<Resolution, LedgerError> {
        let source_hash = encounter.source_hash.as_deref();
        if let Some(id) = tx.find_exact(&hashes.fingerprint, source_hash).await? {
            return Ok(Resolution::Exact(id));
        }

        let candidates = tx.find_candidates(&hashes.player_set_hash).await?;
        if let Some(candidate) = candidates
            .iter()
            .find(|c| self.matcher.evaluate(summary, c).is_duplicate)
        {
            return Ok(Resolution::Fuzzy(candidate.id));
        }

        match tx.insert_encounter(user_id, encounter, hashes).await? {
            InsertOutcome::Created(id) => Ok(Resolution::Created(id)),
            InsertOutcome::FingerprintTaken => {
                tracing::warn!(
                    fingerprint = %hashes.fingerprint,
                    "fingerprint taken by a concurrent upload"
                );
                tx.find_exact(&hashes.fingerprint, source_hash)
                    .await?
                    .map(Resolution::Raced)
                    .ok_or_else(|| {
                        LedgerError::Internal(format!(
                            "fingerprint {} conflicted but no row is visible",
                            hashes.fingerprint
                        ))
                    })
            }
        }
    }

    /// Splits `hashes` into those a stored encounter carries as
    /// fingerprint or source hash and those none does.
    ///
    /// Hashes are trimmed and repeats dropped, keeping input order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when no hash or too many are
    /// given, and [`LedgerError::Storage`] on lookup failure.
    pub async fn check_hashes(&self, hashes: &[String]) -> Result<CheckReport, LedgerError> {
        if hashes.len() > self.limits.max_check_hashes {
            return Err(LedgerError::Validation(format!(
                "at most {} hashes per check",
                self.limits.max_check_hashes
            )));
        }
        let mut unique: Vec<String> = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let hash = hash.trim();
            if !hash.is_empty() && !unique.iter().any(|u| u == hash) {
                unique.push(hash.to_string());
            }
        }
        if unique.is_empty() {
            return Err(LedgerError::Validation(
                "hashes must not be empty".to_string(),
            ));
        }

        let duplicates = self.store.find_by_hashes(&unique).await?;
        let missing = unique
            .into_iter()
            .filter(|h| !duplicates.iter().any(|d| d.hash == *h))
            .collect();
        Ok(CheckReport {
            duplicates,
            missing,
        })
    }
}
