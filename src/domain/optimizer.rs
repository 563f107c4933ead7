//! Heuristic four-module loadout search.
//!
//! The search runs in five phases:
//!
//! 1. **Pre-filter**: group modules by dominant attribute and keep the
//!    best few per group.
//! 2. **Greedy construction**: seed with each retained module and grow
//!    the tuple by the best-scoring addition.
//! 3. **Local search**: first-improvement hill climbing over single
//!    slot swaps.
//! 4. **Deduplicate** by member ids.
//! 5. **Sort and truncate.**
//!
//! The result is an approximate top-K; identical inputs always produce
//! identical output.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::module::{AttrType, Module, ModuleCategory};
use super::power::{
    self, AttrBreakdown, Preferences, attribute_points, priority_bonus, priority_floor,
    resolve_type,
};
use super::scoring_tables::{MAX_LEVEL, attribute_level, total_attr_bonus};
use crate::config::OptimizerConfig;
use crate::error::LedgerError;

/// Modules per loadout.
pub const LOADOUT_SIZE: usize = 4;

type Tuple = [usize; LOADOUT_SIZE];

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SortMode {
    /// Descending score.
    #[default]
    ByScore,
    /// Descending total attribute value, then descending score.
    ByTotalAttr,
}

impl SortMode {
    /// Stable name used in cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ByScore => "byScore",
            Self::ByTotalAttr => "byTotalAttr",
        }
    }
}

/// What to search for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeParams {
    /// Only modules of this category take part.
    pub category: ModuleCategory,
    /// Scoring preferences.
    pub preferences: Preferences,
    /// Solutions to return.
    pub max_solutions: usize,
    /// Result ordering.
    pub sort_mode: SortMode,
}

/// One evaluated loadout.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The four member modules.
    pub modules: Vec<Module>,
    /// Attribute name → summed value.
    pub attr_breakdown: BTreeMap<String, i32>,
    /// Combat-power score.
    pub score: f64,
    /// Minimum priority level reached, 0 if any priority falls short.
    pub priority_level: u8,
    /// Sum of every breakdown value.
    pub total_attr_value: i64,
}

impl Solution {
    /// Evaluates `modules` under `prefs`.
    #[must_use]
    pub fn evaluate(modules: Vec<Module>, prefs: &Preferences) -> Self {
        let breakdown = AttrBreakdown::from_modules(&modules);
        Self {
            score: power::score(&breakdown, prefs),
            priority_level: power::priority_level(
                &breakdown,
                &prefs.priority_attributes,
                &prefs.desired_levels,
            ),
            total_attr_value: breakdown.total_value(),
            attr_breakdown: breakdown.values(),
            modules,
        }
    }

    /// Sorted member ids; two solutions with the same key are duplicates.
    #[must_use]
    pub fn key(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.modules.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids
    }
}

/// Greedy + local-search loadout optimizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleOptimizer {
    config: OptimizerConfig,
}

impl ModuleOptimizer {
    /// Creates an optimizer with the given limits.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Checks request-level bounds before any module is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] when `max_solutions` is outside
    /// `1..=max` or a desired level is outside `1..=6`.
    pub fn validate(&self, params: &OptimizeParams) -> Result<(), LedgerError> {
        if params.max_solutions == 0 || params.max_solutions > self.config.max_solutions {
            return Err(LedgerError::Validation(format!(
                "maxSolutions must be between 1 and {}",
                self.config.max_solutions
            )));
        }
        if let Some((name, level)) = params
            .preferences
            .desired_levels
            .iter()
            .find(|(_, level)| !(1..=MAX_LEVEL).contains(*level))
        {
            return Err(LedgerError::Validation(format!(
                "desired level {level} for {name} must be between 1 and {MAX_LEVEL}"
            )));
        }
        Ok(())
    }

    /// Searches `modules` for the best loadouts.
    ///
    /// Modules outside `params.category` or carrying an excluded
    /// attribute are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for out-of-range parameters or a
    /// module without parts, and [`LedgerError::InsufficientModules`] when
    /// fewer than four modules remain.
    pub fn optimize(
        &self,
        modules: &[Module],
        params: &OptimizeParams,
    ) -> Result<Vec<Solution>, LedgerError> {
        self.validate(params)?;
        let prefs = &params.preferences;

        let pool: Vec<&Module> = modules
            .iter()
            .filter(|m| m.category == params.category)
            .filter(|m| !m.has_any_attribute(&prefs.excluded_attributes))
            .collect();
        if let Some(empty) = pool.iter().find(|m| m.parts.is_empty()) {
            return Err(LedgerError::Validation(format!(
                "module {} has no parts",
                empty.name
            )));
        }
        if pool.len() < LOADOUT_SIZE {
            return Err(LedgerError::InsufficientModules {
                required: LOADOUT_SIZE,
                available: pool.len(),
            });
        }

        let retained = self.prefilter(&pool);
        if retained.len() < LOADOUT_SIZE {
            return Err(LedgerError::InsufficientModules {
                required: LOADOUT_SIZE,
                available: retained.len(),
            });
        }

        let evaluator = Evaluator::new(&pool, prefs);
        let seeds = greedy_candidates(&evaluator, &retained, params.max_solutions * 2);
        let refined = seeds
            .into_iter()
            .map(|tuple| self.local_search(&evaluator, &retained, tuple));

        let mut seen: HashSet<Vec<i64>> = HashSet::new();
        let mut solutions: Vec<Solution> = Vec::new();
        for tuple in refined {
            let members: Vec<Module> = tuple
                .iter()
                .filter_map(|i| pool.get(*i).map(|m| (*m).clone()))
                .collect();
            let solution = Solution::evaluate(members, prefs);
            if seen.insert(solution.key()) {
                solutions.push(solution);
            }
        }

        sort_solutions(&mut solutions, params.sort_mode);
        solutions.truncate(params.max_solutions);
        Ok(solutions)
    }

    /// Indices of modules kept after grouping by dominant attribute,
    /// in input order.
    #[must_use]
    pub fn prefilter(&self, pool: &[&Module]) -> Vec<usize> {
        let limit = self.config.max_modules_per_attribute.max(1);
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, module) in pool.iter().enumerate() {
            if let Some(part) = module.dominant_part() {
                groups.entry(part.name.as_str()).or_default().push(idx);
            }
        }

        let rank = |idx: usize| {
            pool.get(idx)
                .map_or((0, 0), |m| (m.quality, m.total_value()))
        };
        let mut keep = vec![false; pool.len()];
        for members in groups.values_mut() {
            members.sort_by(|a, b| rank(*b).cmp(&rank(*a)));
            for idx in members.iter().take(limit) {
                if let Some(flag) = keep.get_mut(*idx) {
                    *flag = true;
                }
            }
        }
        keep.iter()
            .enumerate()
            .filter_map(|(idx, kept)| kept.then_some(idx))
            .collect()
    }

    fn local_search(&self, evaluator: &Evaluator, retained: &[usize], start: Tuple) -> Tuple {
        let mut current = start;
        let mut current_eval = evaluator.evaluate(&current);
        for _ in 0..self.config.max_iterations {
            match first_improvement(evaluator, retained, &current, &current_eval) {
                Some((next, next_eval)) => {
                    current = next;
                    current_eval = next_eval;
                }
                None => break,
            }
        }
        current
    }
}

/// Seeds one greedy tuple per retained module until `target` distinct
/// tuples exist.
fn greedy_candidates(evaluator: &Evaluator, retained: &[usize], target: usize) -> Vec<Tuple> {
    let mut seen: HashSet<Tuple> = HashSet::new();
    let mut candidates = Vec::new();
    for &seed in retained {
        if candidates.len() >= target {
            break;
        }
        let mut selected = vec![seed];
        let mut remaining: Vec<usize> = retained.iter().copied().filter(|m| *m != seed).collect();
        while selected.len() < LOADOUT_SIZE && !remaining.is_empty() {
            let mut best: Option<(usize, i64)> = None;
            for (pos, &candidate) in remaining.iter().enumerate() {
                selected.push(candidate);
                let points = evaluator.evaluate(&selected).points;
                selected.pop();
                if best.is_none_or(|(_, b)| points > b) {
                    best = Some((pos, points));
                }
            }
            let Some((pos, _)) = best else { break };
            selected.push(remaining.remove(pos));
        }
        if let Ok(tuple) = Tuple::try_from(selected.as_slice()) {
            let mut sorted = tuple;
            sorted.sort_unstable();
            if seen.insert(sorted) {
                candidates.push(tuple);
            }
        }
    }
    candidates
}

/// First single-slot swap that beats `current`, scanning slots in order.
fn first_improvement(
    evaluator: &Evaluator,
    retained: &[usize],
    current: &Tuple,
    current_eval: &Eval,
) -> Option<(Tuple, Eval)> {
    for slot in 0..LOADOUT_SIZE {
        for &candidate in retained {
            if current.contains(&candidate) {
                continue;
            }
            let mut next = *current;
            if let Some(member) = next.get_mut(slot) {
                *member = candidate;
            }
            let next_eval = evaluator.evaluate(&next);
            if next_eval.beats(current_eval, evaluator.has_priority) {
                return Some((next, next_eval));
            }
        }
    }
    None
}

/// Orders solutions in place; the sort is stable.
pub fn sort_solutions(solutions: &mut [Solution], mode: SortMode) {
    let by_score = |a: &Solution, b: &Solution| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(b.priority_level.cmp(&a.priority_level))
    };
    match mode {
        SortMode::ByScore => solutions.sort_by(by_score),
        SortMode::ByTotalAttr => solutions.sort_by(|a, b| {
            b.total_attr_value
                .cmp(&a.total_attr_value)
                .then_with(|| by_score(a, b))
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Eval {
    points: i64,
    priority_level: u8,
}

impl Eval {
    /// Priority level first when priorities exist, then score.
    fn beats(&self, other: &Self, has_priority: bool) -> bool {
        if has_priority {
            self.priority_level > other.priority_level
                || (self.priority_level == other.priority_level && self.points > other.points)
        } else {
            self.points > other.points
        }
    }
}

/// Scores tuples over interned attribute indices instead of name maps.
struct Evaluator {
    parts: Vec<Vec<(usize, i32)>>,
    types: Vec<AttrType>,
    priority: Vec<(Option<usize>, Option<u8>)>,
    has_priority: bool,
}

impl Evaluator {
    fn new(pool: &[&Module], prefs: &Preferences) -> Self {
        let mut names: Vec<&str> = Vec::new();
        let mut types: Vec<AttrType> = Vec::new();
        let mut parts = Vec::with_capacity(pool.len());
        for module in pool {
            let mut interned = Vec::with_capacity(module.parts.len());
            for part in &module.parts {
                let idx = match names.iter().position(|n| *n == part.name) {
                    Some(idx) => idx,
                    None => {
                        names.push(part.name.as_str());
                        types.push(resolve_type(&part.name, part.attr_type));
                        names.len() - 1
                    }
                };
                interned.push((idx, part.value));
            }
            parts.push(interned);
        }
        let priority = prefs
            .priority_attributes
            .iter()
            .map(|name| {
                (
                    names.iter().position(|n| *n == name.as_str()),
                    prefs.desired_level(name),
                )
            })
            .collect();
        Self {
            parts,
            types,
            priority,
            has_priority: prefs.has_priority(),
        }
    }

    fn evaluate(&self, members: &[usize]) -> Eval {
        let mut totals: Vec<(usize, i32)> = Vec::with_capacity(16);
        for parts in members.iter().filter_map(|m| self.parts.get(*m)) {
            for &(attr, value) in parts {
                match totals.iter_mut().find(|(a, _)| *a == attr) {
                    Some((_, total)) => *total = total.saturating_add(value),
                    None => totals.push((attr, value)),
                }
            }
        }

        let mut points: i64 = totals
            .iter()
            .map(|(attr, value)| {
                let attr_type = self.types.get(*attr).copied().unwrap_or(AttrType::Basic);
                attribute_points(attr_type, *value)
            })
            .sum();
        points += total_attr_bonus(totals.len());

        let value_of = |attr: Option<usize>| {
            attr.and_then(|a| totals.iter().find(|(x, _)| *x == a).map(|(_, v)| *v))
        };
        let mut priority_level = if self.has_priority { MAX_LEVEL } else { 0 };
        for &(attr, desired) in &self.priority {
            let value = value_of(attr);
            if let Some(v) = value {
                points += priority_bonus(attribute_level(v), desired);
            }
            priority_level = match priority_floor(value, desired) {
                Some(level) => priority_level.min(level),
                None => 0,
            };
        }

        Eval {
            points,
            priority_level,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::domain::module::ModulePart;

    fn module(id: i64, quality: u8, parts: &[(&str, i32)]) -> Module {
        Module {
            id,
            uuid: uuid::Uuid::from_u128(u128::from(id.unsigned_abs())),
            name: format!("module-{id}"),
            config_id: 5_500_000 + i32::try_from(id).unwrap_or(0),
            quality,
            category: ModuleCategory::Attack,
            parts: parts
                .iter()
                .enumerate()
                .map(|(i, (name, value))| ModulePart {
                    part_id: i32::try_from(i).unwrap_or(0),
                    name: (*name).to_string(),
                    value: *value,
                    attr_type: AttrType::Basic,
                })
                .collect(),
        }
    }

    fn params(max_solutions: usize) -> OptimizeParams {
        OptimizeParams {
            category: ModuleCategory::Attack,
            preferences: Preferences::default(),
            max_solutions,
            sort_mode: SortMode::ByScore,
        }
    }

    fn inventory() -> Vec<Module> {
        vec![
            module(1, 4, &[("Crit Focus", 9), ("Agility Boost", 3)]),
            module(2, 4, &[("Crit Focus", 8), ("Armor", 2)]),
            module(3, 3, &[("Agility Boost", 7), ("Luck Focus", 4)]),
            module(4, 5, &[("Luck Focus", 10), ("DMG Stack", 3)]),
            module(5, 2, &[("Armor", 5)]),
            module(6, 4, &[("DMG Stack", 6), ("Crit Focus", 2)]),
            module(7, 3, &[("Agile", 5), ("Resistance", 4)]),
            module(8, 5, &[("Elite Strike", 9), ("Crit Focus", 4)]),
        ]
    }

    #[test]
    fn four_modules_yield_single_solution() {
        let modules: Vec<Module> = inventory().into_iter().take(4).collect();
        let optimizer = ModuleOptimizer::default();
        let Ok(solutions) = optimizer.optimize(&modules, &params(10)) else {
            panic!("optimization should succeed");
        };
        assert_eq!(solutions.len(), 1);
        let Some(best) = solutions.first() else {
            panic!("one solution expected");
        };
        assert_eq!(best.key(), vec![1, 2, 3, 4]);
        let expected = power::score(
            &AttrBreakdown::from_modules(&modules),
            &Preferences::default(),
        );
        assert_eq!(best.score, expected);
    }

    #[test]
    fn too_few_modules_is_an_error() {
        let modules: Vec<Module> = inventory().into_iter().take(3).collect();
        let result = ModuleOptimizer::default().optimize(&modules, &params(5));
        let Err(LedgerError::InsufficientModules {
            required,
            available,
        }) = result
        else {
            panic!("expected insufficient modules");
        };
        assert_eq!((required, available), (4, 3));
    }

    #[test]
    fn other_categories_are_ignored() {
        let mut modules = inventory();
        for m in modules.iter_mut().skip(3) {
            m.category = ModuleCategory::Defense;
        }
        let result = ModuleOptimizer::default().optimize(&modules, &params(5));
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientModules { available: 3, .. })
        ));
    }

    #[test]
    fn excluded_attributes_remove_modules() {
        let mut p = params(5);
        p.preferences.excluded_attributes = vec!["Crit Focus".into()];
        let Ok(solutions) = ModuleOptimizer::default().optimize(&inventory(), &p) else {
            panic!("optimization should succeed");
        };
        for solution in &solutions {
            assert!(!solution.attr_breakdown.contains_key("Crit Focus"));
        }
    }

    #[test]
    fn solutions_are_valid_distinct_and_sorted() {
        let Ok(solutions) = ModuleOptimizer::default().optimize(&inventory(), &params(20)) else {
            panic!("optimization should succeed");
        };
        assert!(!solutions.is_empty());
        let mut keys = HashSet::new();
        for solution in &solutions {
            let key = solution.key();
            assert_eq!(key.len(), LOADOUT_SIZE);
            let mut unique = key.clone();
            unique.dedup();
            assert_eq!(unique.len(), LOADOUT_SIZE);
            assert!(solution.modules.iter().all(|m| m.category == ModuleCategory::Attack));
            assert!(keys.insert(key));
        }
        assert!(solutions.windows(2).all(|w| match w {
            [a, b] => a.score >= b.score,
            _ => true,
        }));
    }

    #[test]
    fn output_is_deterministic() {
        let optimizer = ModuleOptimizer::default();
        let mut p = params(10);
        p.preferences.priority_attributes = vec!["Crit Focus".into()];
        let modules = inventory();
        let first = optimizer.optimize(&modules, &p).ok();
        let second = optimizer.optimize(&modules, &p).ok();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(optimizer.optimize(&inventory(), &p).ok(), first);
    }

    #[test]
    fn max_solutions_bounds_are_enforced() {
        let optimizer = ModuleOptimizer::default();
        assert!(matches!(
            optimizer.optimize(&inventory(), &params(0)),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            optimizer.optimize(&inventory(), &params(61)),
            Err(LedgerError::Validation(_))
        ));
        let Ok(solutions) = optimizer.optimize(&inventory(), &params(2)) else {
            panic!("optimization should succeed");
        };
        assert!(solutions.len() <= 2);
    }

    #[test]
    fn desired_level_out_of_range_is_rejected() {
        let mut p = params(5);
        p.preferences
            .desired_levels
            .insert("Crit Focus".to_string(), 7);
        assert!(matches!(
            ModuleOptimizer::default().optimize(&inventory(), &p),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn prefilter_keeps_best_per_dominant_attribute() {
        let modules = vec![
            module(1, 2, &[("Crit Focus", 5)]),
            module(2, 5, &[("Crit Focus", 3)]),
            module(3, 5, &[("Crit Focus", 9)]),
            module(4, 3, &[("Armor", 4)]),
        ];
        let pool: Vec<&Module> = modules.iter().collect();
        let optimizer = ModuleOptimizer::new(OptimizerConfig {
            max_modules_per_attribute: 2,
            ..OptimizerConfig::default()
        });
        assert_eq!(optimizer.prefilter(&pool), vec![1, 2, 3]);
    }

    #[test]
    fn evaluator_agrees_with_power_calculator() {
        let modules = inventory();
        let pool: Vec<&Module> = modules.iter().collect();
        let prefs = Preferences {
            priority_attributes: vec!["Crit Focus".into(), "Luck Focus".into()],
            desired_levels: BTreeMap::from([("Crit Focus".to_string(), 4)]),
            excluded_attributes: vec![],
        };
        let evaluator = Evaluator::new(&pool, &prefs);
        for tuple in [[0, 1, 2, 3], [4, 5, 6, 7], [0, 3, 5, 7]] {
            let members: Vec<Module> = tuple
                .iter()
                .filter_map(|i| modules.get(*i).cloned())
                .collect();
            let solution = Solution::evaluate(members, &prefs);
            let eval = evaluator.evaluate(&tuple);
            assert_eq!(solution.score, eval.points as f64);
            assert_eq!(solution.priority_level, eval.priority_level);
        }
    }

    #[test]
    fn ties_on_score_rank_higher_priority_first() {
        let make = |id: i64, level: u8| Solution {
            modules: vec![module(id, 1, &[("Armor", 1)])],
            attr_breakdown: BTreeMap::new(),
            score: 100.0,
            priority_level: level,
            total_attr_value: 1,
        };
        let mut solutions = vec![make(1, 2), make(2, 5), make(3, 0)];
        sort_solutions(&mut solutions, SortMode::ByScore);
        let levels: Vec<u8> = solutions.iter().map(|s| s.priority_level).collect();
        assert_eq!(levels, vec![5, 2, 0]);
    }

    #[test]
    fn total_attr_mode_orders_by_total_then_score() {
        let make = |total: i64, score: f64| Solution {
            modules: vec![],
            attr_breakdown: BTreeMap::new(),
            score,
            priority_level: 0,
            total_attr_value: total,
        };
        let mut solutions = vec![make(10, 50.0), make(12, 10.0), make(10, 70.0)];
        sort_solutions(&mut solutions, SortMode::ByTotalAttr);
        let order: Vec<(i64, f64)> = solutions
            .iter()
            .map(|s| (s.total_attr_value, s.score))
            .collect();
        assert_eq!(order, vec![(12, 10.0), (10, 70.0), (10, 50.0)]);
    }
}
