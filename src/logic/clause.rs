//! Clause normalization of logic rules.
//!
//! A rule `B₁ ∧ … ∧ Bₙ → H₁ ∨ … ∨ Hₘ` is the disjunction
//! `¬B₁ ∨ … ∨ ¬Bₙ ∨ H₁ ∨ … ∨ Hₘ`. Double negations collapse and nested
//! disjunctions flatten; a negated disjunction is a conjunction and is
//! rejected. Negated literals are ordered before positive ones, which is the
//! order grounding joins them in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::formula::{Atom, Formula, LogicRule, Variable};
use crate::error::{RuleError, RuleResult};
use crate::store::FactStore;

/// An atom with a polarity. A negated literal contributes `1 − value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub atom: Atom,
    pub negated: bool,
}

/// A rule normalized to a flat disjunction of literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    /// Negated literals first, each group in rule order.
    pub literals: Vec<Literal>,
    /// Distinct variables in first-occurrence order.
    pub variables: Vec<Variable>,
}

impl Clause {
    /// Normalize a rule. Fails if some formula is not clausal or the rule has
    /// no atoms.
    pub fn from_rule(rule: &LogicRule) -> RuleResult<Self> {
        let mut literals = Vec::new();
        for formula in &rule.body {
            collect_literals(formula, true, &mut literals)?;
        }
        for formula in &rule.head {
            collect_literals(formula, false, &mut literals)?;
        }
        if literals.is_empty() {
            return Err(RuleError::EmptyRule);
        }
        // Stable: keeps rule order inside each polarity group.
        literals.sort_by_key(|l| !l.negated);

        let mut variables: Vec<Variable> = Vec::new();
        for literal in &literals {
            for variable in &literal.atom.variables {
                match variables.iter().find(|v| v.name == variable.name) {
                    Some(existing) if existing.entity_type != variable.entity_type => {
                        return Err(RuleError::VariableTypeMismatch {
                            variable: variable.name.clone(),
                            first: existing.entity_type,
                            second: variable.entity_type,
                        });
                    }
                    Some(_) => {}
                    None => variables.push(variable.clone()),
                }
            }
        }
        Ok(Self {
            literals,
            variables,
        })
    }

    /// Check every atom against the store's predicate signatures.
    pub fn validate(&self, store: &dyn FactStore) -> RuleResult<()> {
        for literal in &self.literals {
            let atom = &literal.atom;
            let predicate = store
                .predicate(atom.predicate)
                .ok_or(RuleError::UnknownPredicate {
                    predicate: atom.predicate,
                })?;
            if predicate.arity() != atom.variables.len() {
                return Err(RuleError::ArityMismatch {
                    predicate: atom.predicate,
                    expected: predicate.arity(),
                    actual: atom.variables.len(),
                });
            }
            for (variable, &slot_type) in atom.variables.iter().zip(&predicate.arguments) {
                if variable.entity_type != slot_type {
                    return Err(RuleError::VariableTypeMismatch {
                        variable: variable.name.clone(),
                        first: variable.entity_type,
                        second: slot_type,
                    });
                }
            }
        }
        Ok(())
    }

    /// Position of each variable name in [`Clause::variables`].
    pub fn variable_positions(&self) -> HashMap<&str, usize> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.as_str(), i))
            .collect()
    }

    /// Number of negated literals; they occupy the front of `literals`.
    pub fn negated_count(&self) -> usize {
        self.literals.iter().take_while(|l| l.negated).count()
    }
}

fn collect_literals(formula: &Formula, negated: bool, out: &mut Vec<Literal>) -> RuleResult<()> {
    match formula {
        Formula::Atom(atom) => {
            out.push(Literal {
                atom: atom.clone(),
                negated,
            });
            Ok(())
        }
        Formula::Negation(inner) => collect_literals(inner, !negated, out),
        Formula::Disjunction(_) if negated => Err(RuleError::NotClausal {
            message: "a negated disjunction is a conjunction".into(),
        }),
        Formula::Disjunction(items) => {
            for item in items {
                collect_literals(item, false, out)?;
            }
            Ok(())
        }
    }
}
