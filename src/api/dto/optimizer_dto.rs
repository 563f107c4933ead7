//! Optimizer request and response DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::module_dto::ModuleDto;
use crate::domain::{OptimizeParams, Preferences, Solution, SortMode};
use crate::error::LedgerError;
use crate::service::{OptimizeMetadata, OptimizeOutcome};

/// Search limits supplied by the client.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeConstraints {
    /// Solutions to return, 1..=60. Defaults to 20.
    #[serde(default)]
    pub max_solutions: Option<usize>,
    /// Result ordering. Defaults to `byScore`.
    #[serde(default)]
    pub sort_mode: Option<SortMode>,
}

/// Request body for `POST /module-optimizer/optimize`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    /// `ATTACK`, `DEFENSE` or `SUPPORT` (any case).
    pub category: String,
    /// Scoring preferences.
    #[serde(default)]
    pub preferences: Preferences,
    /// Search limits.
    #[serde(default)]
    pub constraints: OptimizeConstraints,
}

impl OptimizeRequest {
    /// Resolves defaults and parses the category.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidCategory`] for an unknown category.
    pub fn into_params(self, default_solutions: usize) -> Result<OptimizeParams, LedgerError> {
        Ok(OptimizeParams {
            category: self.category.parse()?,
            preferences: self.preferences,
            max_solutions: self.constraints.max_solutions.unwrap_or(default_solutions),
            sort_mode: self.constraints.sort_mode.unwrap_or_default(),
        })
    }
}

/// One ranked loadout.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolutionDto {
    /// 1-based position in the result list.
    pub rank: usize,
    /// Combat-power score.
    pub score: f64,
    /// Minimum priority level reached.
    pub priority_level: u8,
    /// Sum of all attribute values.
    pub total_attr_value: i64,
    /// The four modules.
    pub modules: Vec<ModuleDto>,
    /// Attribute name to summed value.
    pub attr_breakdown: BTreeMap<String, i32>,
}

impl SolutionDto {
    fn ranked(rank: usize, solution: Solution) -> Self {
        Self {
            rank,
            score: solution.score,
            priority_level: solution.priority_level,
            total_attr_value: solution.total_attr_value,
            modules: solution.modules.into_iter().map(ModuleDto::from).collect(),
            attr_breakdown: solution.attr_breakdown,
        }
    }
}

/// Response metadata.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeMetadataDto {
    /// Modules of the category the caller owns.
    pub total_modules: usize,
    /// Time spent on this request.
    pub processing_time_ms: u64,
    /// Search algorithm name.
    pub algorithm: String,
    /// Whether the solutions came from the cache.
    pub cache_hit: bool,
}

impl From<OptimizeMetadata> for OptimizeMetadataDto {
    fn from(m: OptimizeMetadata) -> Self {
        Self {
            total_modules: m.total_modules,
            processing_time_ms: m.processing_time_ms,
            algorithm: m.algorithm.to_string(),
            cache_hit: m.cache_hit,
        }
    }
}

/// Response body for `POST /module-optimizer/optimize`.
#[derive(Debug, Serialize, ToSchema)]
pub struct OptimizeResponse {
    /// Ranked solutions, best first.
    pub solutions: Vec<SolutionDto>,
    /// How the response was produced.
    pub metadata: OptimizeMetadataDto,
}

impl From<OptimizeOutcome> for OptimizeResponse {
    fn from(outcome: OptimizeOutcome) -> Self {
        Self {
            solutions: outcome
                .solutions
                .into_iter()
                .enumerate()
                .map(|(idx, s)| SolutionDto::ranked(idx + 1, s))
                .collect(),
            metadata: outcome.metadata.into(),
        }
    }
}
