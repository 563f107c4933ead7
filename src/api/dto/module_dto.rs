//! Module inventory DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common_dto::PaginationMeta;
use crate::domain::{Module, ModuleCategory, ModuleDraft, ModulePart};
use crate::error::LedgerError;

/// One module as uploaded.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleIn {
    /// Stable external key.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Game configuration id.
    pub config_id: i32,
    /// Quality tier, 1..=5.
    pub quality: u8,
    /// `ATTACK`, `DEFENSE` or `SUPPORT` (any case).
    pub category: String,
    /// Attribute parts, 1..=10 entries.
    pub attributes: Vec<ModulePart>,
}

impl TryFrom<ModuleIn> for ModuleDraft {
    type Error = LedgerError;

    fn try_from(m: ModuleIn) -> Result<Self, Self::Error> {
        Ok(Self {
            uuid: m.uuid,
            name: m.name,
            config_id: m.config_id,
            quality: m.quality,
            category: m.category.parse()?,
            parts: m.attributes,
        })
    }
}

/// Request body for `PUT /modules`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceModulesRequest {
    /// The complete new inventory.
    pub modules: Vec<ModuleIn>,
}

/// Response body for `PUT /modules`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReplaceModulesResponse {
    /// Modules now stored for the caller.
    pub stored: usize,
}

/// Category filter for `GET /modules`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ModuleFilter {
    /// Only list modules of this category.
    #[serde(default)]
    pub category: Option<String>,
}

/// A module as returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDto {
    /// Storage key.
    pub id: i64,
    /// Stable external key.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Game configuration id.
    pub config_id: i32,
    /// Quality tier.
    pub quality: u8,
    /// Gear category.
    pub category: ModuleCategory,
    /// Attribute parts.
    pub attributes: Vec<ModulePart>,
}

impl From<Module> for ModuleDto {
    fn from(m: Module) -> Self {
        Self {
            id: m.id,
            uuid: m.uuid,
            name: m.name,
            config_id: m.config_id,
            quality: m.quality,
            category: m.category,
            attributes: m.parts,
        }
    }
}

/// Paginated list response for `GET /modules`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleListResponse {
    /// Modules on this page.
    pub data: Vec<ModuleDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
