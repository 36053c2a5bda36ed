//! Join-based grounding of clauses against a fact store.
//!
//! Each clause is grounded by extending rows of partial variable bindings one
//! literal at a time: negated literals first, by index join over stored ground
//! predicates; then positive literals, by enumerating the entity-type domain
//! of still-unbound variables and looking up (or lazily creating) the ground
//! predicate. Rows whose observed literals already satisfy the Łukasiewicz
//! disjunction are pruned.
//!
//! Grounding runs in passes over all clauses until a pass creates no new
//! ground predicate, so predicates created by one rule's head can feed
//! another rule's body.

mod join;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::id::GroundPredicateId;
use crate::logic::{Clause, Literal};
use crate::store::{FactStore, StoreResult};

use join::{ClausePlan, Row};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the grounding engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Maximum fixpoint passes over all rules (default: 10).
    pub max_passes: usize,
    /// Evaluate read-only join steps on the rayon pool (default: true).
    pub parallel: bool,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            max_passes: 10,
            parallel: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One literal occurrence inside a grounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundAtom {
    /// The stored ground predicate, or `None` for a closed-world completion.
    pub id: Option<GroundPredicateId>,
    /// Observed value; closed predicates never leave this empty.
    pub observed: Option<f64>,
}

impl GroundAtom {
    /// The implicit false atom of a missing closed-predicate tuple.
    pub fn closed_world() -> Self {
        Self {
            id: None,
            observed: Some(0.0),
        }
    }

    pub fn is_observed(&self) -> bool {
        self.observed.is_some()
    }
}

/// All groundings of one rule.
///
/// `bindings[name][i]`, `groundings[i]` and `truth_values[i]` describe the
/// same grounding `i`; each `groundings[i]` is aligned with `literals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialGroundedFormula {
    /// Index of the rule in registration order.
    pub rule: usize,
    pub literals: Vec<Literal>,
    pub bindings: BTreeMap<String, Vec<u64>>,
    pub groundings: Vec<Vec<GroundAtom>>,
    /// Łukasiewicz truth of fully observed groundings, `None` otherwise.
    pub truth_values: Vec<Option<f64>>,
}

impl PartialGroundedFormula {
    fn new(rule: usize, clause: &Clause) -> Self {
        Self {
            rule,
            literals: clause.literals.clone(),
            bindings: clause
                .variables
                .iter()
                .map(|v| (v.name.clone(), Vec::new()))
                .collect(),
            groundings: Vec::new(),
            truth_values: Vec::new(),
        }
    }

    fn push(&mut self, clause: &Clause, row: Row, values: &[u64]) {
        for (variable, &value) in clause.variables.iter().zip(values) {
            if let Some(column) = self.bindings.get_mut(&variable.name) {
                column.push(value);
            }
        }
        let fully_observed = row.atoms.iter().all(GroundAtom::is_observed);
        self.truth_values
            .push(fully_observed.then(|| row.truth.min(1.0)));
        self.groundings.push(row.atoms);
    }

    /// Number of groundings.
    pub fn len(&self) -> usize {
        self.groundings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groundings.is_empty()
    }

    /// Variable binding of grounding `index`.
    pub fn binding(&self, index: usize) -> BTreeMap<&str, u64> {
        self.bindings
            .iter()
            .filter_map(|(name, column)| column.get(index).map(|&v| (name.as_str(), v)))
            .collect()
    }
}

/// Summary of a grounding run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingStats {
    pub passes: usize,
    pub reached_fixpoint: bool,
    /// Distinct groundings kept across all rules.
    pub groundings: usize,
    /// Rows dropped because their observed literals satisfy the rule.
    pub pruned: usize,
    /// Latent ground predicates created during grounding.
    pub created_predicates: usize,
}

impl std::fmt::Display for GroundingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "grounding")?;
        writeln!(f, "  passes:       {}", self.passes)?;
        writeln!(f, "  fixpoint:     {}", self.reached_fixpoint)?;
        writeln!(f, "  groundings:   {}", self.groundings)?;
        writeln!(f, "  pruned:       {}", self.pruned)?;
        writeln!(f, "  created:      {}", self.created_predicates)?;
        Ok(())
    }
}

/// Result of grounding a rule set: one formula per rule, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub formulas: Vec<PartialGroundedFormula>,
    pub stats: GroundingStats,
}

// ---------------------------------------------------------------------------
// Grounder
// ---------------------------------------------------------------------------

/// The grounding engine.
#[derive(Debug, Clone, Default)]
pub struct Grounder {
    config: GroundingConfig,
}

impl Grounder {
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    /// Ground every clause to a fixpoint.
    pub fn ground(&self, store: &dyn FactStore, clauses: &[Clause]) -> StoreResult<Grounding> {
        let plans = clauses
            .iter()
            .map(|clause| ClausePlan::new(store, clause))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut formulas: Vec<PartialGroundedFormula> = clauses
            .iter()
            .enumerate()
            .map(|(i, clause)| PartialGroundedFormula::new(i, clause))
            .collect();
        let mut seen: Vec<HashSet<Vec<u64>>> = vec![HashSet::new(); clauses.len()];
        let mut stats = GroundingStats::default();
        let initial_count = store.ground_predicate_count();

        for pass in 1..=self.config.max_passes.max(1) {
            let before = store.ground_predicate_count();
            let mut added = 0usize;

            for (i, plan) in plans.iter().enumerate() {
                let (rows, pruned) = plan.ground(store, self.config.parallel)?;
                stats.pruned += pruned;
                for row in rows {
                    let Some(values) = row.bound_values() else {
                        continue;
                    };
                    if seen[i].insert(values.clone()) {
                        formulas[i].push(&clauses[i], row, &values);
                        added += 1;
                    }
                }
            }

            stats.passes = pass;
            let after = store.ground_predicate_count();
            tracing::debug!(
                pass,
                groundings = added,
                created = after - before,
                "grounding pass complete"
            );
            if after == before {
                stats.reached_fixpoint = true;
                break;
            }
        }

        if !stats.reached_fixpoint {
            tracing::warn!(
                passes = stats.passes,
                "grounding stopped before reaching a fixpoint"
            );
        }

        stats.groundings = formulas.iter().map(PartialGroundedFormula::len).sum();
        stats.created_predicates = store.ground_predicate_count() - initial_count;
        tracing::info!(
            rules = clauses.len(),
            groundings = stats.groundings,
            created = stats.created_predicates,
            passes = stats.passes,
            "grounding complete"
        );
        Ok(Grounding { formulas, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{EntityTypeId, PredicateId};
    use crate::logic::{Formula, LogicRule, Variable};
    use crate::store::MemFactStore;

    struct World {
        store: MemFactStore,
        person: EntityTypeId,
        friends: PredicateId,
        smokes: PredicateId,
        enemies: PredicateId,
    }

    fn world() -> World {
        let store = MemFactStore::new();
        let person = store.add_entity_type(Some("Person"), &[1, 2, 3]).unwrap();
        let friends = store
            .add_predicate(Some("Friends"), &[person, person], true)
            .unwrap();
        let smokes = store.add_predicate(Some("Smokes"), &[person], false).unwrap();
        let enemies = store
            .add_predicate(Some("Enemies"), &[person, person], true)
            .unwrap();
        World {
            store,
            person,
            friends,
            smokes,
            enemies,
        }
    }

    fn atom(predicate: PredicateId, person: EntityTypeId, vars: &[&str]) -> Formula {
        Formula::atom(
            predicate,
            vars.iter().map(|v| Variable::new(*v, person)).collect(),
        )
    }

    fn ground(world: &World, rules: &[LogicRule]) -> Grounding {
        let clauses: Vec<Clause> = rules.iter().map(|r| Clause::from_rule(r).unwrap()).collect();
        Grounder::default().ground(&world.store, &clauses).unwrap()
    }

    fn smoking_rule(w: &World) -> LogicRule {
        LogicRule::soft(
            vec![
                atom(w.friends, w.person, &["x", "y"]),
                atom(w.smokes, w.person, &["x"]),
            ],
            vec![atom(w.smokes, w.person, &["y"])],
            1.0,
            1.0,
        )
    }

    #[test]
    fn shared_variables_agree_across_atoms() {
        let w = world();
        w.store.add_ground_predicate(w.friends, &[1, 2], Some(1.0)).unwrap();
        w.store.add_ground_predicate(w.friends, &[2, 3], Some(1.0)).unwrap();
        w.store.add_ground_predicate(w.smokes, &[1], Some(0.5)).unwrap();

        let grounding = ground(&w, &[smoking_rule(&w)]);
        let formula = &grounding.formulas[0];
        assert!(!formula.is_empty());

        for (i, atoms) in formula.groundings.iter().enumerate() {
            let binding = formula.binding(i);
            let (x, y) = (binding["x"], binding["y"]);
            let friends = w.store.ground_predicate(atoms[0].id.unwrap()).unwrap();
            let smokes_x = w.store.ground_predicate(atoms[1].id.unwrap()).unwrap();
            let smokes_y = w.store.ground_predicate(atoms[2].id.unwrap()).unwrap();
            assert_eq!(friends.arguments, vec![x, y]);
            assert_eq!(smokes_x.arguments, vec![x]);
            assert_eq!(smokes_y.arguments, vec![y]);
        }
    }

    #[test]
    fn lazy_fixpoint_follows_created_predicates() {
        let w = world();
        w.store.add_ground_predicate(w.friends, &[1, 2], Some(1.0)).unwrap();
        w.store.add_ground_predicate(w.friends, &[2, 3], Some(1.0)).unwrap();
        w.store.add_ground_predicate(w.smokes, &[1], Some(0.5)).unwrap();

        let grounding = ground(&w, &[smoking_rule(&w)]);
        let formula = &grounding.formulas[0];

        // Smokes(2) is created in the first pass and grounds (2, 3) in the second.
        let mut pairs: Vec<(u64, u64)> = (0..formula.len())
            .map(|i| {
                let b = formula.binding(i);
                (b["x"], b["y"])
            })
            .collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(1, 2), (2, 3)]);
        assert!(grounding.stats.reached_fixpoint);
        assert_eq!(grounding.stats.created_predicates, 2);
        assert!(w.store.find_ground_predicate(w.smokes, &[3]).is_some());
    }

    #[test]
    fn observed_satisfaction_prunes() {
        let w = world();
        w.store.add_ground_predicate(w.friends, &[1, 2], Some(1.0)).unwrap();
        w.store.add_ground_predicate(w.smokes, &[1], Some(0.0)).unwrap();

        // ¬Smokes(1) is fully true, so the only candidate grounding is satisfied.
        let grounding = ground(&w, &[smoking_rule(&w)]);
        assert!(grounding.formulas[0].is_empty());
        assert!(grounding.stats.pruned >= 1);
        assert!(w.store.find_ground_predicate(w.smokes, &[2]).is_none());
    }

    #[test]
    fn closed_predicates_complete_to_false() {
        let w = world();
        w.store.add_ground_predicate(w.smokes, &[1], Some(1.0)).unwrap();

        // Smokes(x) → Enemies(x, y): every Enemies atom is a closed-world completion.
        let rule = LogicRule::soft(
            vec![atom(w.smokes, w.person, &["x"])],
            vec![atom(w.enemies, w.person, &["x", "y"])],
            1.0,
            1.0,
        );
        let grounding = ground(&w, &[rule]);
        let formula = &grounding.formulas[0];
        assert_eq!(formula.len(), 3);
        for (atoms, truth) in formula.groundings.iter().zip(&formula.truth_values) {
            assert_eq!(atoms[1], GroundAtom::closed_world());
            assert_eq!(*truth, Some(0.0));
        }
        assert!(w.store.ground_predicates_of(w.enemies).is_empty());
    }

    #[test]
    fn negated_closed_join_without_facts_yields_nothing() {
        let w = world();
        let rule = LogicRule::soft(
            vec![atom(w.enemies, w.person, &["x", "y"])],
            vec![atom(w.smokes, w.person, &["x"])],
            1.0,
            1.0,
        );
        let grounding = ground(&w, &[rule]);
        assert!(grounding.formulas[0].is_empty());
        assert_eq!(w.store.ground_predicate_count(), 0);
    }

    #[test]
    fn repeated_variable_in_one_atom() {
        let w = world();
        w.store.add_ground_predicate(w.friends, &[1, 1], Some(1.0)).unwrap();
        w.store.add_ground_predicate(w.friends, &[1, 2], Some(1.0)).unwrap();
        let rule = LogicRule::soft(
            vec![atom(w.friends, w.person, &["x", "x"])],
            vec![atom(w.smokes, w.person, &["x"])],
            1.0,
            1.0,
        );
        let grounding = ground(&w, &[rule]);
        let formula = &grounding.formulas[0];
        assert_eq!(formula.len(), 1);
        assert_eq!(formula.binding(0)["x"], 1);
    }

    #[test]
    fn positive_only_rule_enumerates_domain() {
        let w = world();
        let rule = LogicRule::soft(vec![], vec![atom(w.smokes, w.person, &["x"])], 1.0, 1.0);
        let grounding = ground(&w, &[rule]);
        assert_eq!(grounding.formulas[0].len(), 3);
        assert_eq!(grounding.formulas[0].bindings["x"], vec![1, 2, 3]);
        assert!(grounding.formulas[0].truth_values.iter().all(Option::is_none));
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let run = |parallel: bool| {
            let w = world();
            w.store.add_ground_predicate(w.friends, &[1, 2], Some(1.0)).unwrap();
            w.store.add_ground_predicate(w.friends, &[2, 3], Some(0.7)).unwrap();
            w.store.add_ground_predicate(w.friends, &[3, 1], Some(0.4)).unwrap();
            w.store.add_ground_predicate(w.smokes, &[1], Some(0.5)).unwrap();
            let clauses = vec![Clause::from_rule(&smoking_rule(&w)).unwrap()];
            let grounder = Grounder::new(GroundingConfig {
                parallel,
                ..Default::default()
            });
            let g = grounder.ground(&w.store, &clauses).unwrap();
            (g.formulas[0].bindings.clone(), g.stats.groundings)
        };
        assert_eq!(run(true), run(false));
    }
}
