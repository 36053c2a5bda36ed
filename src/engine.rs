//! Engine facade: top-level API for softlogic.
//!
//! The `Engine` owns the fact store, the registered rules, the compiled
//! program and the retained solver state. Facts and rules are registered
//! through it; `solve` grounds, compiles and runs consensus ADMM, writing the
//! resulting soft truth values back into the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::admm::{AdmmSolver, AdmmState, SolverStatus, SubProblemSelector, selector_for};
use crate::compile::{CompileStats, HingeTerm, RuleCompiler, VariableMap};
use crate::config::EngineConfig;
use crate::constraint::{ConstraintSet, FixOutcome};
use crate::error::{EngineError, RuleError, SoftLogicResult};
use crate::ground::{Grounder, Grounding, GroundingStats};
use crate::id::{EntityTypeId, GroundPredicateId, PredicateId};
use crate::logic::{Clause, LogicRule, RuleWeight};
use crate::store::{FactStore, MemFactStore, check_truth_value};

/// A registered rule and its clausal form.
#[derive(Debug, Clone)]
struct RegisteredRule {
    rule: LogicRule,
    clause: Clause,
}

/// Result of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub status: SolverStatus,
    pub iterations: usize,
    pub objective: f64,
    pub primal_residual: f64,
    pub dual_residual: f64,
    /// Final value of every free variable, in internal index order.
    pub values: Vec<(GroundPredicateId, f64)>,
}

impl std::fmt::Display for SolveReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "solve")?;
        writeln!(f, "  status:       {}", self.status)?;
        writeln!(f, "  iterations:   {}", self.iterations)?;
        writeln!(f, "  objective:    {:.6}", self.objective)?;
        writeln!(f, "  primal:       {:.3e}", self.primal_residual)?;
        writeln!(f, "  dual:         {:.3e}", self.dual_residual)?;
        writeln!(f, "  variables:    {}", self.values.len())?;
        Ok(())
    }
}

/// The softlogic inference engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn FactStore>,
    rules: Vec<RegisteredRule>,
    variables: VariableMap,
    grounding_stats: GroundingStats,
    compile_stats: CompileStats,
    terms: Vec<HingeTerm>,
    /// Facts or rules changed since the last build.
    dirty: bool,
    /// The term list differs from the one the warm state was built for.
    terms_changed: bool,
    constraints: ConstraintSet,
    warm: Option<AdmmState>,
}

impl Engine {
    /// Create an engine over a fresh in-memory store.
    pub fn new(config: EngineConfig) -> SoftLogicResult<Self> {
        Self::with_store(config, Arc::new(MemFactStore::new()))
    }

    /// Create an engine over an existing store.
    pub fn with_store(config: EngineConfig, store: Arc<dyn FactStore>) -> SoftLogicResult<Self> {
        config.validate()?;
        tracing::info!(
            generation = store.generation().get(),
            max_passes = config.grounding.max_passes,
            penalty = config.solver.penalty,
            max_iterations = config.solver.max_iterations,
            "initializing softlogic engine"
        );
        Ok(Self {
            config,
            store,
            rules: Vec::new(),
            variables: VariableMap::new(),
            grounding_stats: GroundingStats::default(),
            compile_stats: CompileStats::default(),
            terms: Vec::new(),
            dirty: true,
            terms_changed: true,
            constraints: ConstraintSet::new(),
            warm: None,
        })
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register an entity type with its allowed values.
    pub fn add_entity_type(
        &mut self,
        name: Option<&str>,
        values: &[u64],
    ) -> SoftLogicResult<EntityTypeId> {
        Ok(self.store.add_entity_type(name, values)?)
    }

    /// Register a predicate over the given argument types.
    pub fn add_predicate(
        &mut self,
        name: Option<&str>,
        arguments: &[EntityTypeId],
        closed: bool,
    ) -> SoftLogicResult<PredicateId> {
        Ok(self.store.add_predicate(name, arguments, closed)?)
    }

    /// Assert a ground predicate, observed when `value` is given.
    pub fn add_ground_predicate(
        &mut self,
        predicate: PredicateId,
        arguments: &[u64],
        value: Option<f64>,
    ) -> SoftLogicResult<GroundPredicateId> {
        let id = self.store.add_ground_predicate(predicate, arguments, value)?;
        self.dirty = true;
        Ok(id)
    }

    /// Register a rule. Returns its index.
    pub fn add_rule(&mut self, rule: LogicRule) -> SoftLogicResult<usize> {
        if let Some(weight) = rule.weight.filter(|w| !w.is_valid()) {
            return Err(RuleError::InvalidWeight {
                weight: weight.weight,
                power: weight.power,
            }
            .into());
        }
        let clause = Clause::from_rule(&rule)?;
        clause.validate(self.store.as_ref())?;
        let index = self.rules.len();
        tracing::debug!(
            rule = index,
            literals = clause.literals.len(),
            hard = rule.is_hard(),
            "registered rule"
        );
        self.rules.push(RegisteredRule { rule, clause });
        self.dirty = true;
        Ok(index)
    }

    // -----------------------------------------------------------------------
    // Grounding, compilation, solving
    // -----------------------------------------------------------------------

    /// Ground every rule against the store. Latent ground predicates reached
    /// by rule heads are created in the store.
    pub fn ground(&self) -> SoftLogicResult<Grounding> {
        let clauses: Vec<Clause> = self.rules.iter().map(|r| r.clause.clone()).collect();
        let grounder = Grounder::new(self.config.grounding.clone());
        Ok(grounder.ground(self.store.as_ref(), &clauses)?)
    }

    /// Ground and compile. The variable map survives rebuilds, so internal
    /// indices and constraints stay valid.
    pub fn build(&mut self) -> SoftLogicResult<&CompileStats> {
        let grounding = self.ground()?;
        let weights: Vec<Option<RuleWeight>> = self.rules.iter().map(|r| r.rule.weight).collect();
        let compiler = RuleCompiler::new(self.config.compiler.clone());
        let program = compiler.compile(&grounding.formulas, &weights, &mut self.variables);

        if program.terms != self.terms {
            self.terms_changed = true;
        }
        self.terms = program.terms;
        self.compile_stats = program.stats;
        self.grounding_stats = grounding.stats;
        self.dirty = false;
        Ok(&self.compile_stats)
    }

    /// Solve with the configured selection strategy.
    pub fn solve(&mut self) -> SoftLogicResult<SolveReport> {
        let mut selector = selector_for(&self.config.solver.selection, self.config.solver.seed);
        self.solve_with_selector(selector.as_mut())
    }

    /// Solve with a caller-supplied sub-problem selector.
    ///
    /// Rebuilds first if facts or rules changed. Warm-starts from the state
    /// retained by the previous solve, then writes every free variable's value
    /// back as its inferred value. Constrained variables receive their fixed
    /// value exactly.
    pub fn solve_with_selector(
        &mut self,
        selector: &mut dyn SubProblemSelector,
    ) -> SoftLogicResult<SolveReport> {
        if self.dirty {
            self.build()?;
        }

        let mut solver = AdmmSolver::new(
            self.config.solver.clone(),
            &self.terms,
            self.constraints.as_slice(),
            self.variables.len(),
        )?;
        let mut state = solver.warm_state(self.warm.take(), !self.terms_changed);
        let outcome = solver.solve_with_selector(&mut state, selector);

        let mut values = Vec::with_capacity(self.variables.len());
        for (index, id) in self.variables.iter() {
            let value = self
                .constraints
                .get(index)
                .unwrap_or_else(|| state.consensus[index]);
            self.store.set_inferred_value(id, value)?;
            values.push((id, value));
        }

        self.terms_changed = false;
        self.warm = Some(state);
        Ok(SolveReport {
            status: outcome.status,
            iterations: outcome.iterations,
            objective: outcome.objective,
            primal_residual: outcome.primal_residual,
            dual_residual: outcome.dual_residual,
            values,
        })
    }

    // -----------------------------------------------------------------------
    // Constraints and warm start
    // -----------------------------------------------------------------------

    /// Pin a ground predicate to `value` for subsequent solves.
    ///
    /// The store's inferred value is set immediately. If the ground predicate
    /// is a free variable of the current program, an equality constraint
    /// replaces any earlier one on the same variable.
    pub fn fix_value(&mut self, id: GroundPredicateId, value: f64) -> SoftLogicResult<FixOutcome> {
        if check_truth_value(value).is_err() || self.store.ground_predicate(id).is_none() {
            return Err(EngineError::InvalidFix { id, value }.into());
        }
        if self.dirty {
            self.build()?;
        }
        self.store.set_inferred_value(id, value)?;

        let Some(variable) = self.variables.index_of(id) else {
            tracing::debug!(%id, value, "fixed value is not a free variable");
            return Ok(FixOutcome::NotAVariable { id });
        };
        self.constraints.fix(variable, value);
        tracing::debug!(%id, variable, value, "registered equality constraint");
        Ok(FixOutcome::Constrained { variable })
    }

    /// Drop every equality constraint.
    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    /// Discard the retained solver state; the next solve starts cold.
    pub fn reset_warm_start(&mut self) {
        self.warm = None;
        self.terms_changed = true;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current value of a ground predicate: observed, else inferred.
    pub fn value_of(&self, id: GroundPredicateId) -> Option<f64> {
        self.store.ground_predicate(id).and_then(|g| g.value())
    }

    /// Human-readable form of a ground predicate, e.g. `Smokes(2)`.
    pub fn describe(&self, id: GroundPredicateId) -> Option<String> {
        let ground = self.store.ground_predicate(id)?;
        let predicate = self.store.predicate(ground.predicate)?;
        let arguments: Vec<String> = ground.arguments.iter().map(u64::to_string).collect();
        Some(format!("{}({})", predicate.label(), arguments.join(", ")))
    }

    pub fn store(&self) -> &dyn FactStore {
        self.store.as_ref()
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn terms(&self) -> &[HingeTerm] {
        &self.terms
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn warm_state(&self) -> Option<&AdmmState> {
        self.warm.as_ref()
    }

    pub fn grounding_stats(&self) -> &GroundingStats {
        &self.grounding_stats
    }

    pub fn compile_stats(&self) -> &CompileStats {
        &self.compile_stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Summary counts of the engine state.
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            rules: self.rules.len(),
            ground_predicates: self.store.ground_predicate_count(),
            variables: self.variables.len(),
            terms: self.terms.len(),
            constraints: self.constraints.len(),
            warm: self.warm.is_some(),
        }
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub rules: usize,
    pub ground_predicates: usize,
    pub variables: usize,
    pub terms: usize,
    pub constraints: usize,
    pub warm: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "softlogic engine info")?;
        writeln!(f, "  rules:        {}", self.rules)?;
        writeln!(f, "  ground preds: {}", self.ground_predicates)?;
        writeln!(f, "  variables:    {}", self.variables)?;
        writeln!(f, "  terms:        {}", self.terms)?;
        writeln!(f, "  constraints:  {}", self.constraints)?;
        writeln!(f, "  warm start:   {}", self.warm)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("rules", &self.rules.len())
            .field("variables", &self.variables.len())
            .field("terms", &self.terms.len())
            .field("constraints", &self.constraints)
            .field("dirty", &self.dirty)
            .finish()
    }
}
