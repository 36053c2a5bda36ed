//! JSON problem descriptions for the command-line tool.
//!
//! ```json
//! {
//!   "entity_types": [{ "name": "Person", "values": [1, 2, 3] }],
//!   "predicates": [
//!     { "name": "Friends", "arguments": ["Person", "Person"], "closed": true },
//!     { "name": "Smokes", "arguments": ["Person"] }
//!   ],
//!   "facts": [
//!     { "predicate": "Friends", "arguments": [1, 2], "value": 1.0 },
//!     { "predicate": "Smokes", "arguments": [1], "value": 1.0 }
//!   ],
//!   "rules": [{
//!     "body": [
//!       { "atom": { "predicate": "Friends", "variables": ["x", "y"] } },
//!       { "atom": { "predicate": "Smokes", "variables": ["x"] } }
//!     ],
//!     "head": [{ "atom": { "predicate": "Smokes", "variables": ["y"] } }],
//!     "weight": 5.0
//!   }]
//! }
//! ```
//!
//! A rule without `weight` is hard. A fact without `value` is latent. Each
//! variable takes the entity type of the argument slot it first appears in.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{EngineError, SoftLogicResult};
use crate::id::{EntityTypeId, PredicateId};
use crate::logic::{Formula, LogicRule, Variable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeDecl {
    pub name: String,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateDecl {
    pub name: String,
    /// Entity type names, one per argument slot.
    pub arguments: Vec<String>,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactDecl {
    pub predicate: String,
    pub arguments: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// A formula over named predicates and variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaDecl {
    Atom {
        predicate: String,
        variables: Vec<String>,
    },
    Not(Box<FormulaDecl>),
    Or(Vec<FormulaDecl>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecl {
    #[serde(default)]
    pub body: Vec<FormulaDecl>,
    #[serde(default)]
    pub head: Vec<FormulaDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default = "default_power")]
    pub power: f64,
}

fn default_power() -> f64 {
    1.0
}

/// A complete problem: schema, facts and rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Problem {
    pub entity_types: Vec<EntityTypeDecl>,
    pub predicates: Vec<PredicateDecl>,
    pub facts: Vec<FactDecl>,
    pub rules: Vec<RuleDecl>,
}

fn parse_error(message: impl Into<String>) -> EngineError {
    EngineError::ProblemParse {
        message: message.into(),
    }
}

impl Problem {
    /// Load a problem from a JSON file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))
    }

    /// Register everything in the problem with `engine`.
    pub fn apply(&self, engine: &mut Engine) -> SoftLogicResult<()> {
        let mut types: HashMap<&str, EntityTypeId> = HashMap::new();
        for decl in &self.entity_types {
            let id = engine.add_entity_type(Some(decl.name.as_str()), &decl.values)?;
            types.insert(&decl.name, id);
        }

        let mut predicates: HashMap<&str, (PredicateId, Vec<EntityTypeId>)> = HashMap::new();
        for decl in &self.predicates {
            let arguments = decl
                .arguments
                .iter()
                .map(|name| {
                    types.get(name.as_str()).copied().ok_or_else(|| {
                        parse_error(format!(
                            "predicate `{}` uses unknown entity type `{name}`",
                            decl.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let id = engine.add_predicate(Some(decl.name.as_str()), &arguments, decl.closed)?;
            predicates.insert(&decl.name, (id, arguments));
        }

        for fact in &self.facts {
            let (id, _) = predicates
                .get(fact.predicate.as_str())
                .ok_or_else(|| {
                    parse_error(format!("fact uses unknown predicate `{}`", fact.predicate))
                })?;
            engine.add_ground_predicate(*id, &fact.arguments, fact.value)?;
        }

        for (index, decl) in self.rules.iter().enumerate() {
            let convert = |formulas: &[FormulaDecl]| {
                formulas
                    .iter()
                    .map(|f| to_formula(f, &predicates))
                    .collect::<Result<Vec<_>, _>>()
            };
            let body = convert(&decl.body)?;
            let head = convert(&decl.head)?;
            let rule = match decl.weight {
                Some(weight) => LogicRule::soft(body, head, weight, decl.power),
                None => LogicRule::hard(body, head),
            };
            engine.add_rule(rule)?;
            tracing::debug!(rule = index, "loaded rule from problem");
        }

        tracing::info!(
            entity_types = self.entity_types.len(),
            predicates = self.predicates.len(),
            facts = self.facts.len(),
            rules = self.rules.len(),
            "problem loaded"
        );
        Ok(())
    }
}

fn to_formula(
    decl: &FormulaDecl,
    predicates: &HashMap<&str, (PredicateId, Vec<EntityTypeId>)>,
) -> Result<Formula, EngineError> {
    match decl {
        FormulaDecl::Atom {
            predicate,
            variables,
        } => {
            let (id, slots) = predicates
                .get(predicate.as_str())
                .ok_or_else(|| parse_error(format!("rule uses unknown predicate `{predicate}`")))?;
            if slots.len() != variables.len() {
                return Err(parse_error(format!(
                    "atom over `{predicate}` has {} variables, expected {}",
                    variables.len(),
                    slots.len()
                )));
            }
            let variables = variables
                .iter()
                .zip(slots)
                .map(|(name, &entity_type)| Variable::new(name.as_str(), entity_type))
                .collect();
            Ok(Formula::atom(*id, variables))
        }
        FormulaDecl::Not(inner) => Ok(to_formula(inner, predicates)?.negate()),
        FormulaDecl::Or(parts) => Ok(Formula::or(
            parts
                .iter()
                .map(|p| to_formula(p, predicates))
                .collect::<Result<Vec<_>, _>>()?,
        )),
    }
}
