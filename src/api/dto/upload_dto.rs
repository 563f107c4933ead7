//! Upload DTOs: encounter batches and preflight hash checks.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Encounter;
use crate::persistence::HashMatch;
use crate::service::{CheckReport, IngestReport};

/// Request body for `POST /upload/encounters`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadEncountersRequest {
    /// Encounters in upload order.
    pub encounters: Vec<Encounter>,
}

/// Response body for `POST /upload/encounters`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadEncountersResponse {
    /// Encounters newly stored by this upload.
    pub ingested: usize,
    /// Stored id for each input encounter, in input order.
    pub ids: Vec<i64>,
}

impl From<IngestReport> for UploadEncountersResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            ingested: report.ingested,
            ids: report.ids,
        }
    }
}

/// Request body for `POST /upload/check`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckHashesRequest {
    /// Fingerprints or client source hashes.
    pub hashes: Vec<String>,
}

/// A hash that is already stored.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDto {
    /// The hash as asked.
    pub hash: String,
    /// Encounter carrying it.
    pub encounter_id: i64,
}

impl From<HashMatch> for DuplicateDto {
    fn from(m: HashMatch) -> Self {
        Self {
            hash: m.hash,
            encounter_id: m.encounter_id,
        }
    }
}

/// Response body for `POST /upload/check`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckHashesResponse {
    /// Known hashes.
    pub duplicates: Vec<DuplicateDto>,
    /// Unknown hashes.
    pub missing: Vec<String>,
}

impl From<CheckReport> for CheckHashesResponse {
    fn from(report: CheckReport) -> Self {
        Self {
            duplicates: report.duplicates.into_iter().map(DuplicateDto::from).collect(),
            missing: report.missing,
        }
    }
}
