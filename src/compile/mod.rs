//! Rule compiler: groundings to hinge-loss potentials.
//!
//! A grounding of the clause `ℓ₁ ∨ … ∨ ℓₖ` has distance to satisfaction
//! `max(0, 1 − Σ truth(ℓᵢ))`. Observed literals fold into a constant, the
//! remaining literals become a linear function of the internal variables, and
//! the grounding contributes `w · max(0, a·x + b)^p`.

pub mod variables;

use serde::{Deserialize, Serialize};

use crate::ground::{GroundAtom, PartialGroundedFormula};
use crate::id::GroundPredicateId;
use crate::logic::{Literal, RuleWeight};

pub use variables::VariableMap;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the rule compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Weight materialized for hard rules (default: 1000). Hard rules always
    /// use power 1.
    pub hard_constraint_weight: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            hard_constraint_weight: 1000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Hinge terms
// ---------------------------------------------------------------------------

/// `weight · max(0, coefficients·x[variables] + constant)^power`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HingeTerm {
    /// Index of the rule this term was compiled from.
    pub rule: usize,
    /// Internal variable indices, distinct.
    pub variables: Vec<usize>,
    pub coefficients: Vec<f64>,
    pub constant: f64,
    pub power: f64,
    pub weight: f64,
}

impl HingeTerm {
    /// `a·x + b`, reading `x` from the full variable vector.
    pub fn linear_value(&self, x: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(&self.coefficients)
            .map(|(&j, &a)| a * x[j])
            .sum::<f64>()
            + self.constant
    }

    /// Potential value at `x`.
    pub fn potential(&self, x: &[f64]) -> f64 {
        let hinge = self.linear_value(x).max(0.0);
        self.weight * hinge.powf(self.power)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Counts from one compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileStats {
    pub groundings: usize,
    /// Dropped because observed literals already bound the distance to zero.
    pub satisfied: usize,
    /// Dropped because no free variable remained.
    pub constant: usize,
    pub terms: usize,
}

/// Terms compiled from a full grounding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub terms: Vec<HingeTerm>,
    pub stats: CompileStats,
}

enum Outcome {
    Term(HingeTerm),
    Satisfied,
    Constant,
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RuleCompiler {
    config: CompilerConfig,
}

impl RuleCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Weight and power a rule is materialized with.
    pub fn effective_weight(&self, weight: Option<RuleWeight>) -> RuleWeight {
        weight.unwrap_or(RuleWeight::new(self.config.hard_constraint_weight, 1.0))
    }

    /// Compile every grounding. `weights[r]` is the weight of rule `r`;
    /// internal indices are allocated in `variables` for surviving terms only.
    pub fn compile(
        &self,
        formulas: &[PartialGroundedFormula],
        weights: &[Option<RuleWeight>],
        variables: &mut VariableMap,
    ) -> CompiledProgram {
        let mut program = CompiledProgram::default();
        for formula in formulas {
            let weight = self.effective_weight(weights.get(formula.rule).copied().flatten());
            for atoms in &formula.groundings {
                program.stats.groundings += 1;
                match compile_grounding(&formula.literals, atoms, weight, formula.rule, variables)
                {
                    Outcome::Term(term) => program.terms.push(term),
                    Outcome::Satisfied => program.stats.satisfied += 1,
                    Outcome::Constant => program.stats.constant += 1,
                }
            }
        }
        program.stats.terms = program.terms.len();
        tracing::info!(
            groundings = program.stats.groundings,
            terms = program.stats.terms,
            satisfied = program.stats.satisfied,
            constant = program.stats.constant,
            variables = variables.len(),
            "compiled hinge-loss terms"
        );
        program
    }

    /// Compile a single grounding, or `None` if it contributes nothing.
    pub fn compile_grounding(
        &self,
        literals: &[Literal],
        atoms: &[GroundAtom],
        weight: Option<RuleWeight>,
        rule: usize,
        variables: &mut VariableMap,
    ) -> Option<HingeTerm> {
        match compile_grounding(literals, atoms, self.effective_weight(weight), rule, variables) {
            Outcome::Term(term) => Some(term),
            Outcome::Satisfied | Outcome::Constant => None,
        }
    }
}

fn compile_grounding(
    literals: &[Literal],
    atoms: &[GroundAtom],
    weight: RuleWeight,
    rule: usize,
    variables: &mut VariableMap,
) -> Outcome {
    // Observed literals: a negated one contributes v − 1, a positive one −v.
    let mut observed_constant = 0.0;
    let mut unobserved: Vec<(GroundPredicateId, bool)> = Vec::new();
    for (literal, atom) in literals.iter().zip(atoms) {
        match (atom.observed, atom.id) {
            (Some(v), _) if literal.negated => observed_constant += v - 1.0,
            (Some(v), _) => observed_constant -= v,
            (None, Some(id)) => unobserved.push((id, literal.negated)),
            (None, None) => {}
        }
    }

    let rule_max = 1.0 + observed_constant;
    if rule_max <= 0.0 {
        return Outcome::Satisfied;
    }

    // Accumulate repeated occurrences per ground predicate, first occurrence first.
    let mut constant = rule_max;
    let mut linear: Vec<(GroundPredicateId, f64)> = Vec::new();
    for (id, negated) in unobserved {
        let delta = if negated {
            constant -= 1.0;
            1.0
        } else {
            -1.0
        };
        match linear.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, coefficient)) => *coefficient += delta,
            None => linear.push((id, delta)),
        }
    }
    linear.retain(|&(_, coefficient)| coefficient != 0.0);
    if linear.is_empty() {
        return Outcome::Constant;
    }

    let (ids, coefficients): (Vec<GroundPredicateId>, Vec<f64>) = linear.into_iter().unzip();
    Outcome::Term(HingeTerm {
        rule,
        variables: ids.into_iter().map(|id| variables.get_or_insert(id)).collect(),
        coefficients,
        constant,
        power: weight.power,
        weight: weight.weight,
    })
}
