//! End-to-end integration tests for the softlogic engine.
//!
//! These tests exercise the full pipeline from fact registration through
//! grounding, compilation and consensus ADMM, and the warm-started re-solve
//! after fixing values.

use softlogic::admm::SolverStatus;
use softlogic::config::EngineConfig;
use softlogic::constraint::FixOutcome;
use softlogic::engine::Engine;
use softlogic::id::{EntityTypeId, GroundPredicateId, PredicateId};
use softlogic::logic::{Formula, LogicRule, Variable};
use softlogic::problem::Problem;

struct Smokers {
    engine: Engine,
    person: EntityTypeId,
    friends: PredicateId,
    smokes: PredicateId,
}

fn var(name: &str, person: EntityTypeId) -> Variable {
    Variable::new(name, person)
}

/// People `people`, `Friends` (closed when `closed`), open `Smokes`, and the rules
/// `Friends(x, y) ∧ Smokes(x) → Smokes(y)` (weight `w`) plus the prior
/// `¬Smokes(x)` (weight 1).
fn smokers(
    people: &[u64],
    friendships: &[(u64, u64)],
    smoking: &[u64],
    w: f64,
    closed: bool,
) -> Smokers {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let person = engine.add_entity_type(Some("Person"), people).unwrap();
    let friends = engine
        .add_predicate(Some("Friends"), &[person, person], closed)
        .unwrap();
    let smokes = engine.add_predicate(Some("Smokes"), &[person], false).unwrap();
    for &(a, b) in friendships {
        engine
            .add_ground_predicate(friends, &[a, b], Some(1.0))
            .unwrap();
    }
    for &p in smoking {
        engine.add_ground_predicate(smokes, &[p], Some(1.0)).unwrap();
    }

    let spread = LogicRule::soft(
        vec![
            Formula::atom(friends, vec![var("x", person), var("y", person)]),
            Formula::atom(smokes, vec![var("x", person)]),
        ],
        vec![Formula::atom(smokes, vec![var("y", person)])],
        w,
        1.0,
    );
    let prior = LogicRule::soft(
        vec![],
        vec![Formula::atom(smokes, vec![var("x", person)]).negate()],
        1.0,
        1.0,
    );
    engine.add_rule(spread).unwrap();
    engine.add_rule(prior).unwrap();
    Smokers {
        engine,
        person,
        friends,
        smokes,
    }
}

fn smokes_id(s: &Smokers, person: u64) -> GroundPredicateId {
    s.engine
        .store()
        .find_ground_predicate(s.smokes, &[person])
        .unwrap()
}

#[test]
fn friends_influence_smoking() {
    let mut s = smokers(&[1, 2, 3], &[(1, 2)], &[1], 5.0, false);
    let report = s.engine.solve().unwrap();
    assert_eq!(report.status, SolverStatus::IterationLimitReached);

    let bob = smokes_id(&s, 2);
    let value = s.engine.value_of(bob).unwrap();
    assert!(value > 0.99, "Smokes(2) = {value}");

    // Nobody befriends 3, so Smokes(3) is never grounded.
    assert!(s.engine.store().find_ground_predicate(s.smokes, &[3]).is_none());
    assert_eq!(s.engine.variables().len(), 1);
    // Observed facts keep their values.
    assert_eq!(s.engine.value_of(smokes_id(&s, 1)), Some(1.0));

    let mut without = smokers(&[1, 2, 3], &[(1, 2)], &[1], 0.0, false);
    without.engine.solve().unwrap();
    let baseline = without.engine.value_of(smokes_id(&without, 2)).unwrap();
    assert!(baseline < 0.01, "Smokes(2) without the rule = {baseline}");
    assert!(value > baseline);
}

#[test]
fn influence_chains_through_latent_predicates() {
    let mut s = smokers(&[1, 2, 3], &[(1, 2), (2, 3)], &[1], 5.0, true);
    s.engine.solve().unwrap();
    assert_eq!(s.engine.variables().len(), 2);
    assert!(s.engine.grounding_stats().reached_fixpoint);
    for person in [2, 3] {
        let value = s.engine.value_of(smokes_id(&s, person)).unwrap();
        assert!(value > 0.99, "Smokes({person}) = {value}");
    }
}

#[test]
fn closed_predicate_without_facts_is_never_a_variable() {
    let mut s = smokers(&[1, 2], &[(1, 2)], &[1], 5.0, true);
    let enemies = s
        .engine
        .add_predicate(Some("Enemies"), &[s.person, s.person], true)
        .unwrap();
    // Friends(x, y) ∧ Smokes(y) → Enemies(x, y)
    s.engine
        .add_rule(LogicRule::soft(
            vec![
                Formula::atom(s.friends, vec![var("x", s.person), var("y", s.person)]),
                Formula::atom(s.smokes, vec![var("y", s.person)]),
            ],
            vec![Formula::atom(
                enemies,
                vec![var("x", s.person), var("y", s.person)],
            )],
            1.0,
            1.0,
        ))
        .unwrap();
    let report = s.engine.solve().unwrap();

    assert!(s.engine.store().ground_predicates_of(enemies).is_empty());
    for (id, _) in &report.values {
        let ground = s.engine.store().ground_predicate(*id).unwrap();
        assert_ne!(ground.predicate, enemies);
    }
    // The closed-world completion still pushes on Smokes(2): 5 up, 1 + 1 down.
    assert!(s.engine.value_of(smokes_id(&s, 2)).unwrap() > 0.99);
}

#[test]
fn fixing_a_value_does_not_move_unrelated_variables() {
    let mut s = smokers(&[1, 2, 3, 4], &[(1, 2), (3, 4)], &[1, 3], 5.0, true);
    s.engine.solve().unwrap();
    let first = smokes_id(&s, 2);
    let second = smokes_id(&s, 4);
    let before = s.engine.value_of(second).unwrap();

    let outcome = s.engine.fix_value(first, 0.0).unwrap();
    assert!(matches!(outcome, FixOutcome::Constrained { .. }));
    let report = s.engine.solve().unwrap();

    assert_eq!(s.engine.value_of(first), Some(0.0));
    let after = s.engine.value_of(second).unwrap();
    assert!((after - before).abs() < 1e-6, "{before} -> {after}");
    assert_eq!(report.values.len(), 2);
}

#[test]
fn fixing_an_observed_fact_is_not_a_constraint() {
    let mut s = smokers(&[1, 2], &[(1, 2)], &[1], 5.0, true);
    s.engine.solve().unwrap();
    let observed = smokes_id(&s, 1);
    assert_eq!(
        s.engine.fix_value(observed, 0.0).unwrap(),
        FixOutcome::NotAVariable { id: observed }
    );
    assert!(s.engine.constraints().is_empty());
}

#[test]
fn identical_runs_reach_identical_fixed_points() {
    let run = || {
        let mut s = smokers(&[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 4)], &[1], 2.0, true);
        let report = s.engine.solve().unwrap();
        report
            .values
            .iter()
            .map(|&(id, value)| (s.engine.describe(id).unwrap(), value))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn hard_rules_dominate_priors() {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let person = engine.add_entity_type(Some("Person"), &[1]).unwrap();
    let rich = engine.add_predicate(Some("Rich"), &[person], false).unwrap();
    let happy = engine.add_predicate(Some("Happy"), &[person], false).unwrap();
    engine.add_ground_predicate(rich, &[1], Some(1.0)).unwrap();
    engine
        .add_rule(LogicRule::hard(
            vec![Formula::atom(rich, vec![var("x", person)])],
            vec![Formula::atom(happy, vec![var("x", person)])],
        ))
        .unwrap();
    engine
        .add_rule(LogicRule::soft(
            vec![],
            vec![Formula::atom(happy, vec![var("x", person)]).negate()],
            10.0,
            1.0,
        ))
        .unwrap();
    engine.solve().unwrap();
    let id = engine.store().find_ground_predicate(happy, &[1]).unwrap();
    assert!(engine.value_of(id).unwrap() > 0.99);
}

#[test]
fn squared_potentials_balance_at_midpoint() {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let person = engine.add_entity_type(Some("Person"), &[1]).unwrap();
    let tall = engine.add_predicate(Some("Tall"), &[person], false).unwrap();
    let atom = || Formula::atom(tall, vec![var("x", person)]);
    engine
        .add_rule(LogicRule::soft(vec![], vec![atom()], 1.0, 2.0))
        .unwrap();
    engine
        .add_rule(LogicRule::soft(vec![], vec![atom().negate()], 1.0, 2.0))
        .unwrap();
    let report = engine.solve().unwrap();
    assert_eq!(report.values.len(), 1);
    assert!((report.values[0].1 - 0.5).abs() < 1e-6);
}

#[test]
fn problem_file_end_to_end() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("smokers.json");
    std::fs::write(
        &path,
        r#"{
            "entity_types": [{ "name": "Person", "values": [1, 2, 3] }],
            "predicates": [
                { "name": "Friends", "arguments": ["Person", "Person"], "closed": true },
                { "name": "Smokes", "arguments": ["Person"] }
            ],
            "facts": [
                { "predicate": "Friends", "arguments": [1, 2], "value": 1.0 },
                { "predicate": "Smokes", "arguments": [1], "value": 1.0 }
            ],
            "rules": [{
                "body": [
                    { "atom": { "predicate": "Friends", "variables": ["x", "y"] } },
                    { "atom": { "predicate": "Smokes", "variables": ["x"] } }
                ],
                "head": [{ "atom": { "predicate": "Smokes", "variables": ["y"] } }],
                "weight": 5.0
            }, {
                "head": [{ "not": { "atom": { "predicate": "Smokes", "variables": ["x"] } } }],
                "weight": 1.0
            }]
        }"#,
    )
    .unwrap();

    let problem = Problem::load(&path).unwrap();
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    problem.apply(&mut engine).unwrap();
    let report = engine.solve().unwrap();

    assert_eq!(report.values.len(), 1);
    let (id, value) = report.values[0];
    assert_eq!(engine.describe(id).unwrap(), "Smokes(2)");
    assert!(value > 0.99);
}
