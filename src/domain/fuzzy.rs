//! Fuzzy duplicate matching between a new upload and a stored candidate.

use super::encounter::{EncounterSummary, StoredEncounter};
use crate::config::DedupConfig;

/// Field-by-field comparison of two encounters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Same scene id, or same scene name when an id is missing.
    pub scene_match: bool,
    /// Same normalized boss list.
    pub boss_match: bool,
    /// Same player ids.
    pub player_set_match: bool,
    /// Sum of per-player share differences; infinite without a player match.
    pub damage_l1_norm: f64,
    /// Relative total-damage difference.
    pub total_damage_diff: f64,
    /// Start-time distance in seconds.
    pub start_time_delta_secs: f64,
    /// Same attempt count.
    pub attempt_count_match: bool,
}

/// A similarity record and its verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchVerdict {
    /// The comparison.
    pub similarity: Similarity,
    /// Whether every threshold held.
    pub is_duplicate: bool,
}

/// Compares encounters under configurable thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatcher {
    thresholds: DedupConfig,
}

impl FuzzyMatcher {
    /// Creates a matcher.
    #[must_use]
    pub fn new(thresholds: DedupConfig) -> Self {
        Self { thresholds }
    }

    /// Computes the similarity record of `a` against `b`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, a: &EncounterSummary, b: &EncounterSummary) -> Similarity {
        let scene_match = match (a.scene_id, b.scene_id) {
            (Some(x), Some(y)) => x == y,
            _ => a.normalized_scene_name() == b.normalized_scene_name(),
        };
        let boss_match = a.normalized_bosses() == b.normalized_bosses();
        let players = a.player_ids();
        let player_set_match = players == b.player_ids();
        let damage_l1_norm = if player_set_match {
            players
                .iter()
                .map(|id| (a.damage_share(*id) - b.damage_share(*id)).abs())
                .sum()
        } else {
            f64::INFINITY
        };
        let start_time_delta_secs =
            a.started_at_ms.abs_diff(b.started_at_ms) as f64 / 1000.0;

        Similarity {
            scene_match,
            boss_match,
            player_set_match,
            damage_l1_norm,
            total_damage_diff: total_damage_diff(a.total_dmg, b.total_dmg),
            start_time_delta_secs,
            attempt_count_match: a.attempts_count == b.attempts_count,
        }
    }

    /// Whether `similarity` passes every threshold.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_duplicate(&self, similarity: &Similarity) -> bool {
        similarity.scene_match
            && similarity.boss_match
            && similarity.player_set_match
            && similarity.damage_l1_norm <= self.thresholds.max_damage_l1
            && similarity.total_damage_diff <= self.thresholds.max_total_damage_diff
            && similarity.start_time_delta_secs <= self.thresholds.max_start_delta_secs as f64
            && similarity.attempt_count_match
    }

    /// Compares `summary` with a stored candidate and decides.
    #[must_use]
    pub fn evaluate(&self, summary: &EncounterSummary, candidate: &StoredEncounter) -> MatchVerdict {
        let similarity = self.compare(summary, &candidate.summary);
        MatchVerdict {
            is_duplicate: self.is_duplicate(&similarity),
            similarity,
        }
    }
}

/// `|a−b| / avg(a, b)` when both totals are positive, 0 when both are
/// zero, 1 otherwise.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn total_damage_diff(a: Option<i64>, b: Option<i64>) -> f64 {
    let a = a.unwrap_or(0).max(0);
    let b = b.unwrap_or(0).max(0);
    match (a, b) {
        (0, 0) => 0.0,
        (x, y) if x > 0 && y > 0 => {
            let avg = (x as f64 + y as f64) / 2.0;
            x.abs_diff(y) as f64 / avg
        }
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn summary() -> EncounterSummary {
        EncounterSummary {
            started_at_ms: 1_700_000_000_000,
            total_dmg: Some(10_000),
            scene_id: Some(101),
            scene_name: None,
            bosses: vec!["Dragon Boss".into()],
            player_damage: BTreeMap::from([(1001, 3000), (1002, 4000), (1003, 3000)]),
            attempts_count: 1,
        }
    }

    fn stored(summary: EncounterSummary) -> StoredEncounter {
        StoredEncounter {
            id: 7,
            ended_at_ms: None,
            fingerprint: String::new(),
            player_set_hash: String::new(),
            summary,
        }
    }

    #[test]
    fn slightly_different_pov_is_duplicate() {
        let matcher = FuzzyMatcher::default();
        let mut other = summary();
        other.total_dmg = Some(10_200);
        other.player_damage = BTreeMap::from([(1001, 3060), (1002, 4080), (1003, 3060)]);
        other.started_at_ms += 10_000;
        let verdict = matcher.evaluate(&summary(), &stored(other));
        assert!(verdict.is_duplicate);
        assert!(verdict.similarity.damage_l1_norm < 1e-9);
        assert!((verdict.similarity.start_time_delta_secs - 10.0).abs() < 1e-9);
    }

    #[test]
    fn next_pull_is_not_duplicate() {
        let matcher = FuzzyMatcher::default();
        let mut other = summary();
        other.started_at_ms += 60_000;
        let verdict = matcher.evaluate(&summary(), &stored(other));
        assert!(!verdict.is_duplicate);
        assert!(verdict.similarity.scene_match);
    }

    #[test]
    fn different_party_has_infinite_distance() {
        let matcher = FuzzyMatcher::default();
        let mut other = summary();
        other.player_damage.remove(&1002);
        other.player_damage.insert(1004, 4000);
        let sim = matcher.compare(&summary(), &other);
        assert!(!sim.player_set_match);
        assert!(sim.damage_l1_norm.is_infinite());
        assert!(!matcher.is_duplicate(&sim));
    }

    #[test]
    fn scene_falls_back_to_name() {
        let matcher = FuzzyMatcher::default();
        let mut a = summary();
        a.scene_id = None;
        a.scene_name = Some("Dragon Lair".into());
        let mut b = summary();
        b.scene_name = Some(" dragon lair".into());
        assert!(matcher.compare(&a, &b).scene_match);
        b.scene_name = Some("Frost Keep".into());
        assert!(!matcher.compare(&a, &b).scene_match);
    }

    #[test]
    fn total_damage_diff_edges() {
        assert!(total_damage_diff(Some(0), None).abs() < f64::EPSILON);
        assert!((total_damage_diff(Some(100), Some(0)) - 1.0).abs() < f64::EPSILON);
        assert!((total_damage_diff(Some(100), Some(102)) - 2.0 / 101.0).abs() < 1e-12);
    }

    #[test]
    fn damage_shift_beyond_threshold_rejects() {
        let matcher = FuzzyMatcher::default();
        let mut other = summary();
        other.player_damage = BTreeMap::from([(1001, 2000), (1002, 5000), (1003, 3000)]);
        let sim = matcher.compare(&summary(), &other);
        assert!((sim.damage_l1_norm - 0.2).abs() < 1e-9);
        assert!(!matcher.is_duplicate(&sim));
    }

    #[test]
    fn attempt_mismatch_rejects() {
        let matcher = FuzzyMatcher::default();
        let mut other = summary();
        other.attempts_count = 2;
        assert!(!matcher.is_duplicate(&matcher.compare(&summary(), &other)));
    }
}
