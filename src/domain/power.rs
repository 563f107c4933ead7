//! Combat-power scoring over attribute breakdowns.
//!
//! Every term of the score is an integer, so [`score`] is exact and
//! bit-for-bit reproducible. The optimizer evaluates tuples through the
//! same per-attribute primitives ([`attribute_points`],
//! [`priority_bonus`], [`priority_floor`]) and therefore agrees with it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::module::{AttrType, Module};
use super::scoring_tables::{
    self, MAX_LEVEL, attribute_level, level_power, level_weight, total_attr_bonus,
};

/// Levels a priority attribute may exceed its desired level by before a
/// penalty applies.
pub const OVERSHOOT_TOLERANCE: u8 = 0;

/// Penalty per level of overshoot past the tolerance.
pub const OVERSHOOT_PENALTY: i64 = 20;

/// Attribute preferences steering the score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    /// Attributes the caller wants levelled.
    #[serde(default)]
    pub priority_attributes: Vec<String>,
    /// Desired level (1..=6) per priority attribute.
    #[serde(default)]
    pub desired_levels: BTreeMap<String, u8>,
    /// Modules carrying any of these attributes are not considered.
    #[serde(default)]
    pub excluded_attributes: Vec<String>,
}

impl Preferences {
    /// Trims names and drops blanks and repeats, keeping first occurrence.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            priority_attributes: dedup_names(self.priority_attributes),
            desired_levels: self
                .desired_levels
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), v))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
            excluded_attributes: dedup_names(self.excluded_attributes),
        }
    }

    /// Whether any priority attribute is listed.
    #[must_use]
    pub fn has_priority(&self) -> bool {
        !self.priority_attributes.is_empty()
    }

    /// Desired level for `name`, if one was set.
    #[must_use]
    pub fn desired_level(&self, name: &str) -> Option<u8> {
        self.desired_levels.get(name).copied()
    }
}

fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_string();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Summed value and resolved type of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrTotal {
    /// Sum of part values.
    pub value: i32,
    /// Type from the category table, else from the first part seen.
    pub attr_type: AttrType,
}

/// Attribute name → summed value across a set of modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrBreakdown {
    entries: BTreeMap<String, AttrTotal>,
}

impl AttrBreakdown {
    /// Sums every part of `modules`.
    #[must_use]
    pub fn from_modules<'a, I>(modules: I) -> Self
    where
        I: IntoIterator<Item = &'a Module>,
    {
        let mut breakdown = Self::default();
        for module in modules {
            for part in &module.parts {
                breakdown.add(&part.name, part.value, part.attr_type);
            }
        }
        breakdown
    }

    /// Adds `value` to `name`.
    pub fn add(&mut self, name: &str, value: i32, part_type: AttrType) {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| AttrTotal {
                value: 0,
                attr_type: resolve_type(name, part_type),
            });
        entry.value = entry.value.saturating_add(value);
    }

    /// Total for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrTotal> {
        self.entries.get(name)
    }

    /// Number of distinct attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no attribute is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrTotal)> {
        self.entries.iter()
    }

    /// Sum of every attribute value.
    #[must_use]
    pub fn total_value(&self) -> i64 {
        self.entries.values().map(|t| i64::from(t.value)).sum()
    }

    /// Name → value map for responses.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, i32> {
        self.entries
            .iter()
            .map(|(name, total)| (name.clone(), total.value))
            .collect()
    }
}

/// Table type for `name`, falling back to the part's own type.
#[must_use]
pub fn resolve_type(name: &str, part_type: AttrType) -> AttrType {
    scoring_tables::attribute_type(name).unwrap_or(part_type)
}

/// Combat power one attribute contributes.
#[must_use]
pub fn attribute_points(attr_type: AttrType, value: i32) -> i64 {
    level_power(attr_type, attribute_level(value))
}

/// Bonus for one present priority attribute at `achieved` level.
#[must_use]
pub fn priority_bonus(achieved: u8, desired: Option<u8>) -> i64 {
    let Some(desired) = desired else {
        return level_weight(achieved) * 50;
    };
    let mut bonus = if achieved >= desired {
        level_weight(desired) * 100
    } else {
        level_weight(achieved) * 50
    };
    if achieved > desired.saturating_add(OVERSHOOT_TOLERANCE) {
        bonus -= OVERSHOOT_PENALTY * i64::from(achieved - desired);
    }
    bonus
}

/// Contribution of one priority attribute to the priority level:
/// `None` when it drags the level to 0, else its achieved level.
#[must_use]
pub fn priority_floor(value: Option<i32>, desired: Option<u8>) -> Option<u8> {
    let achieved = attribute_level(value?);
    match desired {
        Some(d) if achieved < d => None,
        _ => Some(achieved),
    }
}

/// Integer score of `breakdown` under `prefs`.
#[must_use]
pub fn score_points(breakdown: &AttrBreakdown, prefs: &Preferences) -> i64 {
    let mut points: i64 = breakdown
        .iter()
        .map(|(_, total)| attribute_points(total.attr_type, total.value))
        .sum();
    points += total_attr_bonus(breakdown.len());
    for name in &prefs.priority_attributes {
        if let Some(total) = breakdown.get(name) {
            points += priority_bonus(attribute_level(total.value), prefs.desired_level(name));
        }
    }
    points
}

/// Score of `breakdown` under `prefs`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score(breakdown: &AttrBreakdown, prefs: &Preferences) -> f64 {
    score_points(breakdown, prefs) as f64
}

/// Minimum achieved level across `priority_attrs`, or 0 if any is absent
/// or below its desired level. 0 when no priority attribute is given.
#[must_use]
pub fn priority_level(
    breakdown: &AttrBreakdown,
    priority_attrs: &[String],
    desired_levels: &BTreeMap<String, u8>,
) -> u8 {
    let mut level = MAX_LEVEL;
    if priority_attrs.is_empty() {
        return 0;
    }
    for name in priority_attrs {
        let value = breakdown.get(name).map(|t| t.value);
        match priority_floor(value, desired_levels.get(name).copied()) {
            Some(achieved) => level = level.min(achieved),
            None => return 0,
        }
    }
    level.min(MAX_LEVEL)
}
