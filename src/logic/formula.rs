//! First-order formulas and weighted logic rules.
//!
//! Rules are data, not code: they are built programmatically (or from a
//! structured problem file) and normalized to a [`Clause`](super::Clause)
//! when registered.

use serde::{Deserialize, Serialize};

use crate::id::{EntityTypeId, PredicateId};

// ---------------------------------------------------------------------------
// Variables and atoms
// ---------------------------------------------------------------------------

/// A logical variable ranging over one entity type.
///
/// Within a rule a variable is identified by its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub entity_type: EntityTypeId,
}

impl Variable {
    pub fn new(name: impl Into<String>, entity_type: EntityTypeId) -> Self {
        Self {
            name: name.into(),
            entity_type,
        }
    }
}

/// A predicate applied to variables, one per argument slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub predicate: PredicateId,
    pub variables: Vec<Variable>,
}

impl Atom {
    pub fn new(predicate: PredicateId, variables: Vec<Variable>) -> Self {
        Self {
            predicate,
            variables,
        }
    }
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// A formula: an atom, a negation, or a disjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Formula {
    Atom(Atom),
    Negation(Box<Formula>),
    Disjunction(Vec<Formula>),
}

impl Formula {
    /// Shorthand for an atomic formula.
    pub fn atom(predicate: PredicateId, variables: Vec<Variable>) -> Self {
        Self::Atom(Atom::new(predicate, variables))
    }

    /// Negate this formula.
    pub fn negate(self) -> Self {
        Self::Negation(Box::new(self))
    }

    /// Disjunction of the given formulas.
    pub fn or(formulas: impl IntoIterator<Item = Formula>) -> Self {
        Self::Disjunction(formulas.into_iter().collect())
    }

    /// Visit every atom in this formula, depth first.
    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Atom>) {
        match self {
            Formula::Atom(atom) => out.push(atom),
            Formula::Negation(inner) => inner.collect_atoms(out),
            Formula::Disjunction(items) => {
                for item in items {
                    item.collect_atoms(out);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Weight and exponent of a soft rule's hinge-loss potential.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleWeight {
    pub weight: f64,
    pub power: f64,
}

impl RuleWeight {
    pub fn new(weight: f64, power: f64) -> Self {
        Self { weight, power }
    }

    /// Finite non-negative weight with a finite power of at least 1.
    pub fn is_valid(&self) -> bool {
        self.weight.is_finite() && self.weight >= 0.0 && self.power.is_finite() && self.power >= 1.0
    }
}

/// A rule `body₁ ∧ … ∧ bodyₙ → head₁ ∨ … ∨ headₘ`.
///
/// A rule without a weight is a hard constraint, materialized with the
/// compiler's hard-constraint weight and power 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicRule {
    /// Conjunction of body formulas.
    pub body: Vec<Formula>,
    /// Disjunction of head formulas.
    pub head: Vec<Formula>,
    pub weight: Option<RuleWeight>,
}

impl LogicRule {
    /// A hard rule.
    pub fn hard(body: Vec<Formula>, head: Vec<Formula>) -> Self {
        Self {
            body,
            head,
            weight: None,
        }
    }

    /// A soft rule with the given weight and power.
    pub fn soft(body: Vec<Formula>, head: Vec<Formula>, weight: f64, power: f64) -> Self {
        Self {
            body,
            head,
            weight: Some(RuleWeight::new(weight, power)),
        }
    }

    /// Set the weight and power, turning a hard rule into a soft one.
    pub fn with_weight(mut self, weight: f64, power: f64) -> Self {
        self.weight = Some(RuleWeight::new(weight, power));
        self
    }

    pub fn is_hard(&self) -> bool {
        self.weight.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: u64) -> PredicateId {
        PredicateId::new(raw).unwrap()
    }

    fn var(name: &str) -> Variable {
        Variable::new(name, EntityTypeId::new(1).unwrap())
    }

    #[test]
    fn atoms_are_collected_depth_first() {
        let f = Formula::or([
            Formula::atom(pid(1), vec![var("x")]),
            Formula::atom(pid(2), vec![var("y")]).negate(),
        ]);
        let atoms: Vec<PredicateId> = f.atoms().iter().map(|a| a.predicate).collect();
        assert_eq!(atoms, vec![pid(1), pid(2)]);
    }

    #[test]
    fn rule_builders() {
        let body = vec![Formula::atom(pid(1), vec![var("x")])];
        let head = vec![Formula::atom(pid(2), vec![var("x")])];
        let rule = LogicRule::hard(body.clone(), head.clone());
        assert!(rule.is_hard());
        let rule = rule.with_weight(2.0, 1.0);
        assert_eq!(rule, LogicRule::soft(body, head, 2.0, 1.0));
    }

    #[test]
    fn weight_validation() {
        assert!(RuleWeight::new(0.0, 1.0).is_valid());
        assert!(RuleWeight::new(5.0, 2.5).is_valid());
        assert!(!RuleWeight::new(-1.0, 1.0).is_valid());
        assert!(!RuleWeight::new(1.0, 0.5).is_valid());
        assert!(!RuleWeight::new(f64::INFINITY, 1.0).is_valid());
    }
}
