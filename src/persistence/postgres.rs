//! PostgreSQL implementation of the persistence layer.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::{CacheEntry, CachedOptimization, HashMatch, InsertOutcome, match_hashes};
use super::{EncounterStore, EncounterTx, ModuleStore, OptimizationCacheStore};
use crate::domain::encounter::{SkillStatIn, player_damage};
use crate::domain::{
    AttrType, Encounter, EncounterHashes, EncounterSummary, Module, ModuleCategory, ModuleDraft,
    ModulePart, StoredEncounter,
};
use crate::error::LedgerError;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// An open upload transaction. Dropping it without commit rolls back.
pub struct PgEncounterTx {
    tx: Transaction<'static, Postgres>,
}

impl fmt::Debug for PgEncounterTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgEncounterTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl EncounterStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn EncounterTx>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgEncounterTx { tx }))
    }

    async fn find_by_hashes(&self, hashes: &[String]) -> Result<Vec<HashMatch>, LedgerError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT id, fingerprint, source_hash FROM encounters \
             WHERE fingerprint = ANY($1) OR source_hash = ANY($1) ORDER BY id",
        )
        .bind(hashes)
        .fetch_all(&self.pool)
        .await?;

        Ok(match_hashes(
            hashes,
            rows.iter()
                .map(|(id, fp, source)| (*id, fp.as_str(), source.as_deref())),
        ))
    }
}

#[async_trait]
impl EncounterTx for PgEncounterTx {
    async fn find_exact(
        &mut self,
        fingerprint: &str,
        source_hash: Option<&str>,
    ) -> Result<Option<i64>, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM encounters \
             WHERE fingerprint = $1 OR ($2::TEXT IS NOT NULL AND source_hash = $2) \
             ORDER BY id LIMIT 1",
        )
        .bind(fingerprint)
        .bind(source_hash)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn find_candidates(
        &mut self,
        player_set_hash: &str,
    ) -> Result<Vec<StoredEncounter>, LedgerError> {
        let rows = sqlx::query_as::<
            _,
            (
                i64,
                i64,
                Option<i64>,
                Option<i64>,
                Option<i64>,
                Option<String>,
                i32,
                String,
                String,
            ),
        >(
            "SELECT id, started_at_ms, ended_at_ms, total_dmg, scene_id, scene_name, \
             attempts_count, fingerprint, player_set_hash \
             FROM encounters WHERE player_set_hash = $1 ORDER BY id",
        )
        .bind(player_set_hash)
        .fetch_all(&mut *self.tx)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();

        let players = sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT encounter_id, actor_id, damage_dealt FROM encounter_actors \
             WHERE encounter_id = ANY($1) AND is_player ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let bosses = sqlx::query_as::<_, (i64, String)>(
            "SELECT encounter_id, name FROM encounter_bosses \
             WHERE encounter_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut players_by: HashMap<i64, Vec<(i64, i64)>> = HashMap::new();
        for (encounter_id, actor_id, damage) in players {
            players_by
                .entry(encounter_id)
                .or_default()
                .push((actor_id, damage));
        }
        let mut bosses_by: HashMap<i64, Vec<String>> = HashMap::new();
        for (encounter_id, name) in bosses {
            bosses_by.entry(encounter_id).or_default().push(name);
        }

        Ok(rows
            .into_iter()
            .map(
                |(
                    id,
                    started_at_ms,
                    ended_at_ms,
                    total_dmg,
                    scene_id,
                    scene_name,
                    attempts_count,
                    fingerprint,
                    player_set_hash,
                )| StoredEncounter {
                    id,
                    ended_at_ms,
                    fingerprint,
                    player_set_hash,
                    summary: EncounterSummary {
                        started_at_ms,
                        total_dmg,
                        scene_id,
                        scene_name,
                        bosses: bosses_by.remove(&id).unwrap_or_default(),
                        player_damage: player_damage(
                            players_by.remove(&id).unwrap_or_default(),
                        ),
                        attempts_count: u32::try_from(attempts_count).unwrap_or(0),
                    },
                },
            )
            .collect())
    }

    async fn insert_encounter(
        &mut self,
        user_id: i64,
        encounter: &Encounter,
        hashes: &EncounterHashes,
    ) -> Result<InsertOutcome, LedgerError> {
        let attempts = i32::try_from(encounter.attempt_count()).unwrap_or(i32::MAX);
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO encounters (user_id, started_at_ms, ended_at_ms, total_dmg, total_heal, \
             scene_id, scene_name, source_hash, attempts_count, fingerprint, player_set_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (fingerprint) DO NOTHING RETURNING id",
        )
        .bind(user_id)
        .bind(encounter.started_at_ms)
        .bind(encounter.ended_at_ms)
        .bind(encounter.total_dmg)
        .bind(encounter.total_heal)
        .bind(encounter.scene_id)
        .bind(encounter.scene_name.as_deref())
        .bind(encounter.source_hash.as_deref())
        .bind(attempts)
        .bind(&hashes.fingerprint)
        .bind(&hashes.player_set_hash)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(id) = id else {
            return Ok(InsertOutcome::FingerprintTaken);
        };
        self.insert_children(id, encounter).await?;
        Ok(InsertOutcome::Created(id))
    }

    async fn add_uploads(&mut self, user_id: i64, count: i64) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO users (id, upload_count) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET upload_count = users.upload_count + EXCLUDED.upload_count",
        )
        .bind(user_id)
        .bind(count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl PgEncounterTx {
    async fn insert_children(&mut self, id: i64, encounter: &Encounter) -> Result<(), LedgerError> {
        for boss in &encounter.bosses {
            sqlx::query(
                "INSERT INTO encounter_bosses (encounter_id, name, max_hp, defeated) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(&boss.name)
            .bind(boss.max_hp)
            .bind(boss.defeated)
            .execute(&mut *self.tx)
            .await?;
        }

        for actor in &encounter.actors {
            sqlx::query(
                "INSERT INTO encounter_actors (encounter_id, actor_id, name, class_id, is_player, \
                 is_local_player, damage_dealt, heal_dealt, damage_taken, hits, crit_hits) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(id)
            .bind(actor.actor_id)
            .bind(actor.name.as_deref())
            .bind(actor.class_id)
            .bind(actor.is_player)
            .bind(actor.is_local_player)
            .bind(actor.damage_dealt)
            .bind(actor.heal_dealt)
            .bind(actor.damage_taken)
            .bind(actor.hits)
            .bind(actor.crit_hits)
            .execute(&mut *self.tx)
            .await?;
        }

        for attempt in &encounter.attempts {
            sqlx::query(
                "INSERT INTO encounter_attempts (encounter_id, attempt_index, started_at_ms, \
                 ended_at_ms, outcome, boss_hp_start, boss_hp_end, total_deaths) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(attempt.index)
            .bind(attempt.started_at_ms)
            .bind(attempt.ended_at_ms)
            .bind(attempt.outcome.as_deref())
            .bind(attempt.boss_hp_start)
            .bind(attempt.boss_hp_end)
            .bind(attempt.total_deaths)
            .execute(&mut *self.tx)
            .await?;
        }

        for phase in &encounter.phases {
            sqlx::query(
                "INSERT INTO encounter_phases (encounter_id, phase_type, started_at_ms, \
                 ended_at_ms, outcome) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id)
            .bind(&phase.phase_type)
            .bind(phase.started_at_ms)
            .bind(phase.ended_at_ms)
            .bind(phase.outcome.as_deref())
            .execute(&mut *self.tx)
            .await?;
        }

        for death in &encounter.deaths {
            sqlx::query(
                "INSERT INTO encounter_deaths (encounter_id, actor_id, occurred_at_ms, \
                 killer_name, skill_id, attempt_index) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(id)
            .bind(death.actor_id)
            .bind(death.occurred_at_ms)
            .bind(death.killer_name.as_deref())
            .bind(death.skill_id)
            .bind(death.attempt_index)
            .execute(&mut *self.tx)
            .await?;
        }

        self.insert_skills(id, "damage", &encounter.damage_skills)
            .await?;
        self.insert_skills(id, "heal", &encounter.heal_skills).await?;

        for entity in &encounter.entities {
            sqlx::query(
                "INSERT INTO encounter_entities (encounter_id, entity_id, name, template_id) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(entity.entity_id)
            .bind(entity.name.as_deref())
            .bind(entity.template_id)
            .execute(&mut *self.tx)
            .await?;
        }

        for detail in &encounter.player_details {
            sqlx::query(
                "INSERT INTO encounter_player_details (encounter_id, actor_id, payload) \
                 VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(detail.actor_id)
            .bind(&detail.payload)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_skills(
        &mut self,
        id: i64,
        kind: &str,
        skills: &[SkillStatIn],
    ) -> Result<(), LedgerError> {
        for skill in skills {
            sqlx::query(
                "INSERT INTO encounter_skill_stats (encounter_id, kind, actor_id, skill_id, name, \
                 total, hits, crit_hits) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(id)
            .bind(kind)
            .bind(skill.actor_id)
            .bind(skill.skill_id)
            .bind(skill.name.as_deref())
            .bind(skill.total)
            .bind(skill.hits)
            .bind(skill.crit_hits)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }
}

type PartRow = (i64, i32, String, i32, String);

fn part_from_row((_, part_id, name, value, attr_type): PartRow) -> Result<ModulePart, LedgerError> {
    let attr_type: AttrType = attr_type
        .parse()
        .map_err(|_| LedgerError::Storage(format!("stored attribute type {attr_type} is unknown")))?;
    Ok(ModulePart {
        part_id,
        name,
        value,
        attr_type,
    })
}

fn group_parts(rows: Vec<PartRow>) -> Result<HashMap<i64, Vec<ModulePart>>, LedgerError> {
    let mut parts: HashMap<i64, Vec<ModulePart>> = HashMap::new();
    for row in rows {
        let module_id = row.0;
        parts.entry(module_id).or_default().push(part_from_row(row)?);
    }
    Ok(parts)
}

#[async_trait]
impl ModuleStore for PgStore {
    async fn list_modules(
        &self,
        user_id: i64,
        category: Option<ModuleCategory>,
    ) -> Result<Vec<Module>, LedgerError> {
        let rows = sqlx::query_as::<_, (i64, Uuid, String, i32, i16, String)>(
            "SELECT id, uuid, name, config_id, quality, category FROM modules \
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR category = $2) ORDER BY id",
        )
        .bind(user_id)
        .bind(category.map(ModuleCategory::as_str))
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        let mut parts = self.module_parts(user_id, &ids).await?;

        rows.into_iter()
            .map(|(id, uuid, name, config_id, quality, category)| {
                Ok(Module {
                    id,
                    uuid,
                    name,
                    config_id,
                    quality: u8::try_from(quality).map_err(|_| {
                        LedgerError::Storage(format!("module {id} has quality {quality}"))
                    })?,
                    category: category.parse().map_err(|_| {
                        LedgerError::Storage(format!("module {id} has category {category}"))
                    })?,
                    parts: parts.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn module_parts(
        &self,
        user_id: i64,
        module_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<ModulePart>>, LedgerError> {
        if module_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, PartRow>(
            "SELECT p.module_id, p.part_id, p.name, p.value, p.attr_type \
             FROM module_parts p JOIN modules m ON m.id = p.module_id \
             WHERE m.user_id = $1 AND p.module_id = ANY($2) ORDER BY p.id",
        )
        .bind(user_id)
        .bind(module_ids)
        .fetch_all(&self.pool)
        .await?;
        group_parts(rows)
    }

    async fn replace_modules(
        &self,
        user_id: i64,
        drafts: &[ModuleDraft],
    ) -> Result<usize, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM modules WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM optimization_results WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for draft in drafts {
            let id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO modules (user_id, uuid, name, config_id, quality, category) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(user_id)
            .bind(draft.uuid)
            .bind(&draft.name)
            .bind(draft.config_id)
            .bind(i16::from(draft.quality))
            .bind(draft.category.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| uuid_conflict(e, draft.uuid))?;

            for part in &draft.parts {
                sqlx::query(
                    "INSERT INTO module_parts (module_id, part_id, name, value, attr_type) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(id)
                .bind(part.part_id)
                .bind(&part.name)
                .bind(part.value)
                .bind(part.attr_type.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(drafts.len())
    }
}

fn uuid_conflict(err: sqlx::Error, uuid: Uuid) -> LedgerError {
    if let sqlx::Error::Database(db) = &err
        && db.code().as_deref() == Some(UNIQUE_VIOLATION)
    {
        return LedgerError::Validation(format!("module {uuid} is already registered"));
    }
    err.into()
}

#[async_trait]
impl OptimizationCacheStore for PgStore {
    async fn read_live(
        &self,
        user_id: i64,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedOptimization>, LedgerError> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT combinations, processing_time_ms, created_at, expires_at \
             FROM optimization_results \
             WHERE user_id = $1 AND request_hash = $2 AND expires_at > $3 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(request_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(combinations, processing_time_ms, created_at, expires_at)| CachedOptimization {
                combinations,
                processing_time_ms,
                created_at,
                expires_at,
            },
        ))
    }

    async fn write(&self, entry: CacheEntry) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO optimization_results \
             (user_id, request_hash, combinations, processing_time_ms, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.user_id)
        .bind(&entry.request_hash)
        .bind(&entry.combinations)
        .bind(entry.processing_time_ms)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM optimization_results WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
