//! Static scoring tables for module attributes.
//!
//! Pure data: attribute categories, level thresholds, per-level combat
//! power, the distinct-attribute bonus and the level weights used by
//! priority bonuses. [`validate`] must pass before the optimizer runs;
//! `main` calls it at startup.

use serde::Serialize;
use utoipa::ToSchema;

use super::module::AttrType;

/// Highest attainable attribute level.
pub const MAX_LEVEL: u8 = 6;

/// Summed attribute values at which levels 1..=6 start.
pub const LEVEL_THRESHOLDS: [i32; 6] = [1, 4, 8, 12, 16, 20];

/// Known attribute names and their types.
pub const ATTRIBUTE_TYPES: &[(&str, AttrType)] = &[
    ("Strength Boost", AttrType::Basic),
    ("Agility Boost", AttrType::Basic),
    ("Intellect Boost", AttrType::Basic),
    ("Special Attack", AttrType::Basic),
    ("Elite Strike", AttrType::Basic),
    ("Healing Boost", AttrType::Basic),
    ("Healing Enhance", AttrType::Basic),
    ("Cast Focus", AttrType::Basic),
    ("Attack SPD", AttrType::Basic),
    ("Crit Focus", AttrType::Basic),
    ("Luck Focus", AttrType::Basic),
    ("Resistance", AttrType::Basic),
    ("Armor", AttrType::Basic),
    ("Final Protection", AttrType::Special),
    ("Agile", AttrType::Special),
    ("Life Condense", AttrType::Special),
    ("First Aid", AttrType::Special),
    ("Life Wave", AttrType::Special),
    ("Life Steal", AttrType::Special),
    ("Team Luck & Crit", AttrType::Special),
    ("DMG Stack", AttrType::Special),
];

/// Combat power per level for basic attributes.
pub const BASIC_POWER: &[(u8, i64)] = &[(1, 7), (2, 14), (3, 29), (4, 44), (5, 167), (6, 254)];

/// Combat power per level for special attributes.
pub const SPECIAL_POWER: &[(u8, i64)] =
    &[(1, 14), (2, 29), (3, 59), (4, 89), (5, 298), (6, 448)];

/// Bonus by number of distinct attributes in a breakdown.
pub const TOTAL_ATTR_BONUS: &[(usize, i64)] = &[
    (0, 0),
    (1, 5),
    (2, 11),
    (3, 17),
    (4, 23),
    (5, 29),
    (6, 34),
    (7, 40),
    (8, 46),
];

/// Weight per level used by priority bonuses.
pub const LEVEL_WEIGHTS: &[(u8, i64)] = &[(1, 1), (2, 4), (3, 8), (4, 12), (5, 16), (6, 20)];

/// Looks up the category table; `None` for unknown names.
#[must_use]
pub fn attribute_type(name: &str) -> Option<AttrType> {
    ATTRIBUTE_TYPES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
}

/// Number of thresholds not exceeding `value`, capped at [`MAX_LEVEL`].
#[must_use]
pub fn attribute_level(value: i32) -> u8 {
    let reached = LEVEL_THRESHOLDS.iter().filter(|t| **t <= value).count();
    u8::try_from(reached).unwrap_or(MAX_LEVEL).min(MAX_LEVEL)
}

/// Combat power of one attribute at `level`; 0 for level 0.
#[must_use]
pub fn level_power(attr_type: AttrType, level: u8) -> i64 {
    let table = match attr_type {
        AttrType::Basic => BASIC_POWER,
        AttrType::Special => SPECIAL_POWER,
    };
    lookup(table, level)
}

/// Priority weight of `level`; 0 for level 0.
#[must_use]
pub fn level_weight(level: u8) -> i64 {
    lookup(LEVEL_WEIGHTS, level)
}

/// Bonus for `distinct` attributes. Counts past the table use the entry
/// at the highest defined count at or below them.
#[must_use]
pub fn total_attr_bonus(distinct: usize) -> i64 {
    TOTAL_ATTR_BONUS
        .iter()
        .filter(|(count, _)| *count <= distinct)
        .max_by_key(|(count, _)| *count)
        .map_or(0, |(_, bonus)| *bonus)
}

fn lookup(table: &[(u8, i64)], level: u8) -> i64 {
    table
        .iter()
        .find(|(l, _)| *l == level)
        .map_or(0, |(_, v)| *v)
}

/// Table cardinality problem found by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scoring table {table} is missing level {level}")]
pub struct TableError {
    /// Name of the incomplete table.
    pub table: &'static str,
    /// First level without an entry.
    pub level: u8,
}

/// Checks that every per-level table covers levels 1..=6 and that the
/// thresholds ascend.
///
/// # Errors
///
/// Returns the first missing level as a [`TableError`].
pub fn validate() -> Result<(), TableError> {
    let tables: [(&'static str, &[(u8, i64)]); 3] = [
        ("basic_power", BASIC_POWER),
        ("special_power", SPECIAL_POWER),
        ("level_weights", LEVEL_WEIGHTS),
    ];
    for (name, table) in tables {
        for level in 1..=MAX_LEVEL {
            if !table.iter().any(|(l, _)| *l == level) {
                return Err(TableError { table: name, level });
            }
        }
    }
    let ascending = LEVEL_THRESHOLDS.windows(2).all(|w| match w {
        [a, b] => a < b,
        _ => true,
    });
    if !ascending {
        return Err(TableError {
            table: "level_thresholds",
            level: 0,
        });
    }
    if !TOTAL_ATTR_BONUS.iter().any(|(count, _)| *count == 0) {
        return Err(TableError {
            table: "total_attr_bonus",
            level: 0,
        });
    }
    Ok(())
}

/// Serializable snapshot of every table, for the config endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoringTablesView {
    /// Level thresholds.
    pub level_thresholds: Vec<i32>,
    /// Attribute name → type.
    #[schema(value_type = Vec<Object>)]
    pub attribute_types: Vec<(String, AttrType)>,
    /// Level → basic power.
    #[schema(value_type = Vec<Object>)]
    pub basic_power: Vec<(u8, i64)>,
    /// Level → special power.
    #[schema(value_type = Vec<Object>)]
    pub special_power: Vec<(u8, i64)>,
    /// Distinct count → bonus.
    #[schema(value_type = Vec<Object>)]
    pub total_attr_bonus: Vec<(usize, i64)>,
    /// Level → weight.
    #[schema(value_type = Vec<Object>)]
    pub level_weights: Vec<(u8, i64)>,
}

impl ScoringTablesView {
    /// Copies the static tables.
    #[must_use]
    pub fn current() -> Self {
        Self {
            level_thresholds: LEVEL_THRESHOLDS.to_vec(),
            attribute_types: ATTRIBUTE_TYPES
                .iter()
                .map(|(n, t)| ((*n).to_string(), *t))
                .collect(),
            basic_power: BASIC_POWER.to_vec(),
            special_power: SPECIAL_POWER.to_vec(),
            total_attr_bonus: TOTAL_ATTR_BONUS.to_vec(),
            level_weights: LEVEL_WEIGHTS.to_vec(),
        }
    }
}
