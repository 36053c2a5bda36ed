// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # softlogic
//!
//! Probabilistic soft logic: weighted first-order rules over soft truth values
//! in [0, 1], relaxed with Łukasiewicz logic into hinge-loss potentials and
//! solved by consensus ADMM.
//!
//! ## Architecture
//!
//! - **Fact store** (`store`): entity types, predicates and ground predicates
//!   behind the `FactStore` trait, with a DashMap-backed in-memory store
//! - **Logic** (`logic`): formulas, rules, clause normalization and
//!   Łukasiewicz connectives
//! - **Grounding** (`ground`): join-based grounding to a fixpoint
//! - **Compilation** (`compile`): groundings to hinge-loss terms over a dense
//!   variable space
//! - **Solver** (`admm`): consensus ADMM with closed-form local solves
//! - **Constraints** (`constraint`): equality constraints for warm-started
//!   re-solves
//!
//! ## Library usage
//!
//! ```no_run
//! use softlogic::config::EngineConfig;
//! use softlogic::engine::Engine;
//! use softlogic::logic::{Formula, LogicRule, Variable};
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! let person = engine.add_entity_type(Some("Person"), &[1, 2]).unwrap();
//! let friends = engine.add_predicate(Some("Friends"), &[person, person], true).unwrap();
//! let smokes = engine.add_predicate(Some("Smokes"), &[person], false).unwrap();
//! engine.add_ground_predicate(friends, &[1, 2], Some(1.0)).unwrap();
//! engine.add_ground_predicate(smokes, &[1], Some(1.0)).unwrap();
//!
//! let x = Variable::new("x", person);
//! let y = Variable::new("y", person);
//! engine
//!     .add_rule(LogicRule::soft(
//!         vec![
//!             Formula::atom(friends, vec![x.clone(), y.clone()]),
//!             Formula::atom(smokes, vec![x]),
//!         ],
//!         vec![Formula::atom(smokes, vec![y])],
//!         5.0,
//!         1.0,
//!     ))
//!     .unwrap();
//! let report = engine.solve().unwrap();
//! println!("{report}");
//! ```

pub mod admm;
pub mod compile;
pub mod config;
pub mod constraint;
pub mod engine;
pub mod error;
pub mod ground;
pub mod id;
pub mod linalg;
pub mod logic;
pub mod problem;
pub mod store;
