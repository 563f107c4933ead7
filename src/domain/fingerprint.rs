//! Deterministic encounter digests.
//!
//! The strong `fingerprint` covers scene, bosses, per-player damage share,
//! attempt count and a coarse start-time bucket; the weak
//! `player_set_hash` covers only the sorted player ids and is used to
//! fetch fuzzy-match candidates. Both are lowercase SHA-256 hex and do
//! not depend on actor or boss order.

use super::encounter::EncounterSummary;
use super::hashing::sha256_hex;
use crate::config::DedupConfig;

/// Both digests of one encounter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterHashes {
    /// Strong digest for exact duplicate detection.
    pub fingerprint: String,
    /// Weak digest used as candidate key.
    pub player_set_hash: String,
}

/// Builds canonical strings and digests with a fixed bucket size.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    bucket_secs: i64,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(DedupConfig::default().bucket_secs)
    }
}

impl Fingerprinter {
    /// Creates a fingerprinter; bucket sizes below one second become one.
    #[must_use]
    pub fn new(bucket_secs: i64) -> Self {
        Self {
            bucket_secs: bucket_secs.max(1),
        }
    }

    /// Start-time bucket, aligned to the epoch.
    #[must_use]
    pub fn start_bucket(&self, started_at_ms: i64) -> i64 {
        started_at_ms.div_euclid(1000).div_euclid(self.bucket_secs)
    }

    /// Pipe-joined canonical form the fingerprint digests.
    #[must_use]
    pub fn canonical(&self, summary: &EncounterSummary) -> String {
        let scene = match (summary.scene_id, summary.normalized_scene_name()) {
            (Some(id), _) => format!("scene_id:{id}"),
            (None, Some(name)) => format!("scene_name:{name}"),
            (None, None) => "scene:unknown".to_string(),
        };

        let bosses = summary.normalized_bosses();
        let bosses = if bosses.is_empty() {
            "bosses:none".to_string()
        } else {
            format!("bosses:{}", bosses.join(","))
        };

        let players = if summary.player_damage.is_empty() {
            "players:none".to_string()
        } else {
            let entries: Vec<String> = summary
                .player_damage
                .keys()
                .map(|id| format!("{id}:{:.2}", share_percent(summary.damage_share(*id))))
                .collect();
            format!("players:{}", entries.join(","))
        };

        format!(
            "{scene}|{bosses}|{players}|attempts:{}|start_bucket:{}",
            summary.attempts_count,
            self.start_bucket(summary.started_at_ms)
        )
    }

    /// Strong digest.
    #[must_use]
    pub fn fingerprint(&self, summary: &EncounterSummary) -> String {
        sha256_hex(self.canonical(summary).as_bytes())
    }

    /// Both digests.
    #[must_use]
    pub fn hashes(&self, summary: &EncounterSummary) -> EncounterHashes {
        EncounterHashes {
            fingerprint: self.fingerprint(summary),
            player_set_hash: player_set_hash(summary),
        }
    }
}

/// Digest of the comma-joined sorted player ids.
#[must_use]
pub fn player_set_hash(summary: &EncounterSummary) -> String {
    let ids: Vec<String> = summary.player_ids().iter().map(i64::to_string).collect();
    sha256_hex(ids.join(",").as_bytes())
}

/// Share in `[0, 1]` as a percentage rounded half away from zero to two
/// decimals.
#[must_use]
pub fn share_percent(share: f64) -> f64 {
    (share * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn summary() -> EncounterSummary {
        EncounterSummary {
            started_at_ms: 1_700_000_010_000,
            total_dmg: Some(10_000),
            scene_id: Some(101),
            scene_name: Some("Dragon Lair".into()),
            bosses: vec!["Dragon Boss".into()],
            player_damage: BTreeMap::from([(1001, 3000), (1002, 4000), (1003, 3000)]),
            attempts_count: 1,
        }
    }

    #[test]
    fn canonical_form_is_fixed_order() {
        let fp = Fingerprinter::default();
        assert_eq!(
            fp.canonical(&summary()),
            "scene_id:101|bosses:dragon boss|players:1001:30.00,1002:40.00,1003:30.00|attempts:1|start_bucket:56666667"
        );
    }

    #[test]
    fn missing_fields_use_placeholders() {
        let fp = Fingerprinter::default();
        let mut s = summary();
        s.scene_id = None;
        s.scene_name = None;
        s.bosses.clear();
        s.player_damage.clear();
        let canonical = fp.canonical(&s);
        assert!(canonical.starts_with("scene:unknown|bosses:none|players:none|"));

        s.scene_name = Some("  Dragon LAIR ".into());
        assert!(fp.canonical(&s).starts_with("scene_name:dragon lair|"));
    }

    #[test]
    fn boss_order_and_case_do_not_matter() {
        let fp = Fingerprinter::default();
        let mut a = summary();
        a.bosses = vec!["Wyrm".into(), "Dragon Boss".into()];
        let mut b = summary();
        b.bosses = vec![" dragon boss".into(), "WYRM ".into()];
        assert_eq!(fp.fingerprint(&a), fp.fingerprint(&b));
    }

    #[test]
    fn every_field_changes_the_fingerprint() {
        let fp = Fingerprinter::default();
        let base = fp.fingerprint(&summary());

        let mut s = summary();
        s.scene_id = Some(102);
        assert_ne!(fp.fingerprint(&s), base);

        let mut s = summary();
        s.bosses = vec!["Dragon Bos".into()];
        assert_ne!(fp.fingerprint(&s), base);

        let mut s = summary();
        s.player_damage.insert(1004, 0);
        assert_ne!(fp.fingerprint(&s), base);

        let mut s = summary();
        s.player_damage.insert(1001, 3002);
        assert_ne!(fp.fingerprint(&s), base);

        let mut s = summary();
        s.attempts_count = 2;
        assert_ne!(fp.fingerprint(&s), base);

        let mut s = summary();
        s.started_at_ms += 30_000;
        assert_ne!(fp.fingerprint(&s), base);
    }

    #[test]
    fn same_bucket_keeps_fingerprint() {
        let fp = Fingerprinter::default();
        let mut s = summary();
        s.started_at_ms += 5_000;
        assert_eq!(fp.fingerprint(&s), fp.fingerprint(&summary()));
    }

    #[test]
    fn zero_total_damage_yields_zero_percent() {
        let fp = Fingerprinter::default();
        let mut s = summary();
        s.total_dmg = None;
        assert!(fp.canonical(&s).contains("players:1001:0.00,1002:0.00,1003:0.00"));
    }

    #[test]
    fn player_set_hash_ignores_damage() {
        let mut s = summary();
        let before = player_set_hash(&s);
        s.player_damage.insert(1001, 1);
        assert_eq!(player_set_hash(&s), before);

        s.player_damage.remove(&1002);
        s.player_damage.insert(1004, 4000);
        assert_ne!(player_set_hash(&s), before);
        assert_eq!(before.len(), 64);
    }

    #[test]
    fn share_rounds_to_two_decimals() {
        assert!((share_percent(0.123_46) - 12.35).abs() < 1e-9);
        assert!((share_percent(1.0) - 100.0).abs() < 1e-9);
    }
}
