//! Equipment modules and their attribute parts.
//!
//! A [`Module`] is one piece of four-slot gear owned by exactly one user.
//! Its [`ModulePart`]s are the only source of attribute values the
//! optimizer sees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LedgerError;

/// Lowest quality a module can have.
pub const MIN_QUALITY: u8 = 1;
/// Highest quality a module can have.
pub const MAX_QUALITY: u8 = 5;
/// Upper bound on parts per module.
pub const MAX_PARTS: usize = 10;

/// Gear category; a loadout draws all four modules from one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleCategory {
    /// Offensive modules.
    Attack,
    /// Defensive modules.
    Defense,
    /// Support modules.
    Support,
}

impl ModuleCategory {
    /// Canonical upper-case name, as stored and hashed.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "ATTACK",
            Self::Defense => "DEFENSE",
            Self::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleCategory {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ATTACK" => Ok(Self::Attack),
            "DEFENSE" => Ok(Self::Defense),
            "SUPPORT" => Ok(Self::Support),
            _ => Err(LedgerError::InvalidCategory(s.to_string())),
        }
    }
}

/// Attribute type, selecting the combat-power table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    /// Common stat attribute.
    Basic,
    /// Rare effect attribute with a steeper power curve.
    Special,
}

impl AttrType {
    /// Lower-case name, as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Special => "special",
        }
    }
}

impl FromStr for AttrType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "special" => Ok(Self::Special),
            other => Err(LedgerError::Validation(format!("unknown attribute type {other}"))),
        }
    }
}

/// One attribute contribution of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModulePart {
    /// Game-side attribute identifier.
    pub part_id: i32,
    /// Attribute name (the breakdown key).
    pub name: String,
    /// Attribute points, at least 1.
    pub value: i32,
    /// Attribute type as reported by the client.
    #[serde(rename = "type")]
    pub attr_type: AttrType,
}

/// A stored module belonging to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Storage key.
    pub id: i64,
    /// Stable external key, globally unique.
    pub uuid: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Game configuration id of the module template.
    pub config_id: i32,
    /// Quality tier, 1..=5.
    pub quality: u8,
    /// Gear category.
    pub category: ModuleCategory,
    /// Attribute parts, 1..=10 entries.
    pub parts: Vec<ModulePart>,
}

impl Module {
    /// Sum of all part values.
    #[must_use]
    pub fn total_value(&self) -> i64 {
        self.parts.iter().map(|p| i64::from(p.value)).sum()
    }

    /// The part with the highest value; the first one wins a tie.
    #[must_use]
    pub fn dominant_part(&self) -> Option<&ModulePart> {
        self.parts
            .iter()
            .fold(None, |best: Option<&ModulePart>, part| match best {
                Some(b) if b.value >= part.value => Some(b),
                _ => Some(part),
            })
    }

    /// Returns `true` if any part carries one of `names`.
    #[must_use]
    pub fn has_any_attribute(&self, names: &[String]) -> bool {
        self.parts.iter().any(|p| names.iter().any(|n| *n == p.name))
    }
}

/// A module as uploaded by the client, before it has a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDraft {
    /// Stable external key.
    pub uuid: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Game configuration id of the module template.
    pub config_id: i32,
    /// Quality tier, 1..=5.
    pub quality: u8,
    /// Gear category.
    pub category: ModuleCategory,
    /// Attribute parts.
    pub parts: Vec<ModulePart>,
}

impl ModuleDraft {
    /// Checks quality range, part count and part values.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(LedgerError::Validation(format!(
                "module {} has quality {} outside {MIN_QUALITY}..={MAX_QUALITY}",
                self.name, self.quality
            )));
        }
        if self.parts.is_empty() {
            return Err(LedgerError::Validation(format!(
                "module {} has no parts",
                self.name
            )));
        }
        if self.parts.len() > MAX_PARTS {
            return Err(LedgerError::Validation(format!(
                "module {} has more than {MAX_PARTS} parts",
                self.name
            )));
        }
        if let Some(part) = self.parts.iter().find(|p| p.value < 1) {
            return Err(LedgerError::Validation(format!(
                "part {} of module {} must have a positive value",
                part.name, self.name
            )));
        }
        if let Some(part) = self.parts.iter().find(|p| p.name.trim().is_empty()) {
            return Err(LedgerError::Validation(format!(
                "part {} of module {} has an empty name",
                part.part_id, self.name
            )));
        }
        Ok(())
    }

    /// Attaches a storage key.
    #[must_use]
    pub fn into_module(self, id: i64) -> Module {
        Module {
            id,
            uuid: self.uuid,
            name: self.name,
            config_id: self.config_id,
            quality: self.quality,
            category: self.category,
            parts: self.parts,
        }
    }
}
