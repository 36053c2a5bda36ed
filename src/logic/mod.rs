//! Logic model: formulas, rules, clauses and Łukasiewicz connectives.

pub mod clause;
pub mod formula;
pub mod lukasiewicz;

pub use clause::{Clause, Literal};
pub use formula::{Atom, Formula, LogicRule, RuleWeight, Variable};
