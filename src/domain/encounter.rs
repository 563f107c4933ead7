//! Encounter uploads and their normalized summaries.
//!
//! [`Encounter`] is the full client-summarized payload with every nested
//! row the store persists. [`EncounterSummary`] is the narrow view the
//! fingerprinter and fuzzy matcher work on; [`StoredEncounter`] is the
//! same view preloaded from storage for a fuzzy candidate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LedgerError;

/// A boss fought in the encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BossIn {
    /// Monster name.
    pub name: String,
    /// Maximum hit points, when known.
    #[serde(default)]
    pub max_hp: Option<i64>,
    /// Whether the boss died.
    #[serde(default)]
    pub defeated: bool,
}

/// Per-actor totals. Players and NPCs share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActorIn {
    /// Game-side actor id.
    pub actor_id: i64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Class identifier.
    #[serde(default)]
    pub class_id: Option<i32>,
    /// Only players take part in fingerprints.
    pub is_player: bool,
    /// The uploader's own character.
    #[serde(default)]
    pub is_local_player: bool,
    /// Damage dealt over the encounter.
    #[serde(default)]
    pub damage_dealt: i64,
    /// Healing done over the encounter.
    #[serde(default)]
    pub heal_dealt: i64,
    /// Damage received.
    #[serde(default)]
    pub damage_taken: i64,
    /// Hits landed.
    #[serde(default)]
    pub hits: i64,
    /// Critical hits landed.
    #[serde(default)]
    pub crit_hits: i64,
}

/// One pull of the encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttemptIn {
    /// Zero-based attempt number.
    pub index: i32,
    /// Attempt start.
    pub started_at_ms: i64,
    /// Attempt end.
    #[serde(default)]
    pub ended_at_ms: Option<i64>,
    /// Free-form outcome (`wipe`, `clear`, ...).
    #[serde(default)]
    pub outcome: Option<String>,
    /// Boss HP when the attempt started.
    #[serde(default)]
    pub boss_hp_start: Option<i64>,
    /// Boss HP when the attempt ended.
    #[serde(default)]
    pub boss_hp_end: Option<i64>,
    /// Deaths during the attempt.
    #[serde(default)]
    pub total_deaths: i32,
}

/// A fight phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhaseIn {
    /// Phase kind (`mob`, `boss`, ...).
    pub phase_type: String,
    /// Phase start.
    pub started_at_ms: i64,
    /// Phase end.
    #[serde(default)]
    pub ended_at_ms: Option<i64>,
    /// Phase outcome.
    #[serde(default)]
    pub outcome: Option<String>,
}

/// A recorded death.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeathIn {
    /// Actor that died.
    pub actor_id: i64,
    /// Time of death.
    pub occurred_at_ms: i64,
    /// Killer display name.
    #[serde(default)]
    pub killer_name: Option<String>,
    /// Killing skill.
    #[serde(default)]
    pub skill_id: Option<i64>,
    /// Attempt the death belongs to.
    #[serde(default)]
    pub attempt_index: Option<i32>,
}

/// Damage or heal totals for one skill of one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkillStatIn {
    /// Actor using the skill.
    pub actor_id: i64,
    /// Skill identifier.
    pub skill_id: i64,
    /// Skill display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Summed amount.
    pub total: i64,
    /// Number of hits.
    #[serde(default)]
    pub hits: i64,
    /// Number of critical hits.
    #[serde(default)]
    pub crit_hits: i64,
}

/// A non-player entity seen during the encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityIn {
    /// Entity id.
    pub entity_id: i64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Monster template id.
    #[serde(default)]
    pub template_id: Option<i64>,
}

/// Free-form per-player detail (gear, talents), stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDetailIn {
    /// Player actor id.
    pub actor_id: i64,
    /// Opaque detail document.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

/// One client-summarized encounter upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    /// Wall-clock start, ms since epoch.
    pub started_at_ms: i64,
    /// Wall-clock end, ms since epoch.
    #[serde(default)]
    pub ended_at_ms: Option<i64>,
    /// Aggregate damage, drives damage shares.
    #[serde(default)]
    pub total_dmg: Option<i64>,
    /// Aggregate healing.
    #[serde(default)]
    pub total_heal: Option<i64>,
    /// Scene id (preferred for equality).
    #[serde(default)]
    pub scene_id: Option<i64>,
    /// Scene name.
    #[serde(default)]
    pub scene_name: Option<String>,
    /// Client-supplied idempotency token.
    #[serde(default)]
    pub source_hash: Option<String>,
    /// Explicit attempt count; defaults to the number of attempts.
    #[serde(default)]
    pub attempts_count: Option<u32>,
    /// Bosses fought.
    #[serde(default)]
    pub bosses: Vec<BossIn>,
    /// Players and NPCs.
    #[serde(default)]
    pub actors: Vec<ActorIn>,
    /// Pulls.
    #[serde(default)]
    pub attempts: Vec<AttemptIn>,
    /// Fight phases.
    #[serde(default)]
    pub phases: Vec<PhaseIn>,
    /// Deaths.
    #[serde(default)]
    pub deaths: Vec<DeathIn>,
    /// Damage per skill.
    #[serde(default)]
    pub damage_skills: Vec<SkillStatIn>,
    /// Healing per skill.
    #[serde(default)]
    pub heal_skills: Vec<SkillStatIn>,
    /// Non-player entities.
    #[serde(default)]
    pub entities: Vec<EntityIn>,
    /// Detailed player data.
    #[serde(default)]
    pub player_details: Vec<PlayerDetailIn>,
}

impl Encounter {
    /// Attempt count used for matching.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempts_count
            .unwrap_or_else(|| u32::try_from(self.attempts.len()).unwrap_or(u32::MAX))
    }

    /// Rejects uploads no summary could describe.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] on a non-positive start time,
    /// an end before the start, or negative damage.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.started_at_ms <= 0 {
            return Err(LedgerError::Validation(
                "startedAtMs must be positive".to_string(),
            ));
        }
        if self.ended_at_ms.is_some_and(|end| end < self.started_at_ms) {
            return Err(LedgerError::Validation(
                "endedAtMs precedes startedAtMs".to_string(),
            ));
        }
        if self.total_dmg.is_some_and(|d| d < 0) || self.actors.iter().any(|a| a.damage_dealt < 0)
        {
            return Err(LedgerError::Validation(
                "damage values must not be negative".to_string(),
            ));
        }
        if let Some(hash) = &self.source_hash
            && hash.trim().is_empty()
        {
            return Err(LedgerError::Validation(
                "sourceHash must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Normalized view for fingerprinting and matching.
    #[must_use]
    pub fn summary(&self) -> EncounterSummary {
        EncounterSummary {
            started_at_ms: self.started_at_ms,
            total_dmg: self.total_dmg,
            scene_id: self.scene_id,
            scene_name: self.scene_name.clone(),
            bosses: self.bosses.iter().map(|b| b.name.clone()).collect(),
            player_damage: player_damage(
                self.actors
                    .iter()
                    .filter(|a| a.is_player)
                    .map(|a| (a.actor_id, a.damage_dealt)),
            ),
            attempts_count: self.attempt_count(),
        }
    }
}

/// Sums damage per player id; the key set is the player set.
#[must_use]
pub fn player_damage<I>(rows: I) -> BTreeMap<i64, i64>
where
    I: IntoIterator<Item = (i64, i64)>,
{
    let mut map = BTreeMap::new();
    for (actor_id, damage) in rows {
        let slot = map.entry(actor_id).or_insert(0_i64);
        *slot = slot.saturating_add(damage);
    }
    map
}

/// The fields duplicate detection looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterSummary {
    /// Start, ms since epoch.
    pub started_at_ms: i64,
    /// Aggregate damage.
    pub total_dmg: Option<i64>,
    /// Scene id.
    pub scene_id: Option<i64>,
    /// Scene name.
    pub scene_name: Option<String>,
    /// Boss names as uploaded.
    pub bosses: Vec<String>,
    /// Player actor id → damage dealt, players only.
    pub player_damage: BTreeMap<i64, i64>,
    /// Attempt count.
    pub attempts_count: u32,
}

impl EncounterSummary {
    /// Lower-cased, trimmed, sorted boss names.
    #[must_use]
    pub fn normalized_bosses(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .bosses
            .iter()
            .map(|b| b.trim().to_lowercase())
            .collect();
        names.sort();
        names
    }

    /// Lower-cased, trimmed scene name.
    #[must_use]
    pub fn normalized_scene_name(&self) -> Option<String> {
        self.scene_name
            .as_deref()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
    }

    /// Sorted player ids.
    #[must_use]
    pub fn player_ids(&self) -> Vec<i64> {
        self.player_damage.keys().copied().collect()
    }

    /// Player's share of total damage in `[0, 1]`; 0 when the total is
    /// missing or not positive.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn damage_share(&self, actor_id: i64) -> f64 {
        let total = self.total_dmg.unwrap_or(0);
        if total <= 0 {
            return 0.0;
        }
        let dealt = self.player_damage.get(&actor_id).copied().unwrap_or(0);
        (dealt as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// A persisted encounter preloaded as a fuzzy-match candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEncounter {
    /// Storage key.
    pub id: i64,
    /// Stored end time.
    pub ended_at_ms: Option<i64>,
    /// Stored strong digest.
    pub fingerprint: String,
    /// Stored candidate key.
    pub player_set_hash: String,
    /// Players, bosses and attempts as stored.
    pub summary: EncounterSummary,
}
