//! Row-at-a-time join evaluation for one clause.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use rayon::prelude::*;

use super::GroundAtom;
use crate::error::StoreError;
use crate::id::PredicateId;
use crate::logic::{Clause, lukasiewicz};
use crate::store::{FactStore, GroundPredicate, StoreResult};

type PatternCache = DashMap<Vec<Option<u64>>, Arc<Vec<GroundPredicate>>>;

/// A partial grounding: variable values, atoms so far, and the summed truth
/// of its observed literals.
#[derive(Debug, Clone)]
pub(super) struct Row {
    pub values: Vec<Option<u64>>,
    pub atoms: Vec<GroundAtom>,
    pub truth: f64,
}

impl Row {
    fn empty(variables: usize) -> Self {
        Self {
            values: vec![None; variables],
            atoms: Vec::new(),
            truth: 0.0,
        }
    }

    /// Full binding vector, or `None` while some variable is unbound.
    pub fn bound_values(&self) -> Option<Vec<u64>> {
        self.values.iter().copied().collect()
    }

    fn extend(&self, values: Vec<Option<u64>>, atom: GroundAtom, truth: f64) -> Self {
        let mut atoms = Vec::with_capacity(self.atoms.len() + 1);
        atoms.extend_from_slice(&self.atoms);
        atoms.push(atom);
        Self {
            values,
            atoms,
            truth,
        }
    }
}

#[derive(Debug)]
struct LiteralPlan {
    predicate: PredicateId,
    closed: bool,
    negated: bool,
    /// Variable position of each argument slot.
    slots: Vec<usize>,
}

/// A clause resolved against the store's signatures and domains.
#[derive(Debug)]
pub(super) struct ClausePlan {
    literals: Vec<LiteralPlan>,
    /// Allowed values of each variable, ascending.
    domains: Vec<Vec<u64>>,
}

impl ClausePlan {
    pub fn new(store: &dyn FactStore, clause: &Clause) -> StoreResult<Self> {
        let positions = clause.variable_positions();
        let mut literals = Vec::with_capacity(clause.literals.len());
        for literal in &clause.literals {
            let predicate = store
                .predicate(literal.atom.predicate)
                .ok_or(StoreError::UnknownPredicate {
                    id: literal.atom.predicate,
                })?;
            let slots = literal
                .atom
                .variables
                .iter()
                .filter_map(|v| positions.get(v.name.as_str()).copied())
                .collect();
            literals.push(LiteralPlan {
                predicate: predicate.id,
                closed: predicate.closed,
                negated: literal.negated,
                slots,
            });
        }
        let domains = clause
            .variables
            .iter()
            .map(|v| {
                store
                    .entity_type(v.entity_type)
                    .map(|t| t.values.into_iter().collect())
                    .ok_or(StoreError::UnknownEntityType { id: v.entity_type })
            })
            .collect::<StoreResult<Vec<Vec<u64>>>>()?;
        Ok(Self { literals, domains })
    }

    /// One grounding pass. Returns the surviving rows and the number of rows
    /// pruned as already satisfied.
    pub fn ground(&self, store: &dyn FactStore, parallel: bool) -> StoreResult<(Vec<Row>, usize)> {
        let pruned = AtomicUsize::new(0);
        let mut rows = vec![Row::empty(self.domains.len())];
        for literal in &self.literals {
            rows = if literal.negated {
                let cache = PatternCache::new();
                map_rows(rows, parallel, |row| {
                    self.join_negated(store, literal, &cache, &pruned, row)
                })?
            } else {
                let expanded = map_rows(rows, parallel, |row| Ok(self.expand(literal, row)))?;
                self.resolve_positive(store, literal, expanded, &pruned)?
            };
            if rows.is_empty() {
                break;
            }
        }
        Ok((rows, pruned.into_inner()))
    }

    /// Index join of a negated literal against stored ground predicates.
    fn join_negated(
        &self,
        store: &dyn FactStore,
        literal: &LiteralPlan,
        cache: &PatternCache,
        pruned: &AtomicUsize,
        row: Row,
    ) -> StoreResult<Vec<Row>> {
        let pattern: Vec<Option<u64>> = literal.slots.iter().map(|&v| row.values[v]).collect();
        let fully_bound = pattern.iter().all(Option::is_some);
        let matches = lookup(cache, store, literal.predicate, pattern)?;

        if matches.is_empty() {
            // A missing closed tuple is false, so its negation satisfies the row.
            if fully_bound && literal.closed {
                pruned.fetch_add(1, Ordering::Relaxed);
            }
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for ground in matches.iter() {
            let mut values = row.values.clone();
            if !unify(&mut values, &literal.slots, &ground.arguments) {
                continue;
            }
            let observed = if literal.closed {
                Some(ground.observed.unwrap_or(0.0))
            } else {
                ground.observed
            };
            let truth = row.truth + observed.map_or(0.0, |v| lukasiewicz::literal(v, true));
            if lukasiewicz::is_satisfied(truth) {
                pruned.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            out.push(row.extend(
                values,
                GroundAtom {
                    id: Some(ground.id),
                    observed,
                },
                truth,
            ));
        }
        Ok(out)
    }

    /// Bind every unbound variable of `literal` over its domain.
    fn expand(&self, literal: &LiteralPlan, row: Row) -> Vec<Row> {
        let mut unbound: Vec<usize> = Vec::new();
        for &v in &literal.slots {
            if row.values[v].is_none() && !unbound.contains(&v) {
                unbound.push(v);
            }
        }

        let mut rows = vec![row];
        for v in unbound {
            rows = rows
                .into_iter()
                .flat_map(|row| {
                    self.domains[v].iter().map(move |&value| {
                        let mut next = row.clone();
                        next.values[v] = Some(value);
                        next
                    })
                })
                .collect();
        }
        rows
    }

    /// Look up or create the ground predicate of a fully bound positive
    /// literal. Runs on the calling thread, in row order, so newly created
    /// identifiers are deterministic.
    fn resolve_positive(
        &self,
        store: &dyn FactStore,
        literal: &LiteralPlan,
        rows: Vec<Row>,
        pruned: &AtomicUsize,
    ) -> StoreResult<Vec<Row>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let arguments: Vec<u64> = literal.slots.iter().filter_map(|&v| row.values[v]).collect();
            if arguments.len() != literal.slots.len() {
                continue;
            }

            let atom = if literal.closed {
                match store.find_ground_predicate(literal.predicate, &arguments) {
                    Some(id) => GroundAtom {
                        id: Some(id),
                        observed: Some(
                            store
                                .ground_predicate(id)
                                .and_then(|g| g.observed)
                                .unwrap_or(0.0),
                        ),
                    },
                    None => GroundAtom::closed_world(),
                }
            } else {
                let (id, created) =
                    store.get_or_create_ground_predicate(literal.predicate, &arguments)?;
                let observed = if created {
                    None
                } else {
                    store.ground_predicate(id).and_then(|g| g.observed)
                };
                GroundAtom {
                    id: Some(id),
                    observed,
                }
            };

            let truth = row.truth + atom.observed.unwrap_or(0.0);
            if lukasiewicz::is_satisfied(truth) {
                pruned.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            let values = row.values.clone();
            out.push(row.extend(values, atom, truth));
        }
        Ok(out)
    }
}

/// Apply a fallible row expansion, in parallel if requested. Output order
/// follows input order either way.
fn map_rows<F>(rows: Vec<Row>, parallel: bool, f: F) -> StoreResult<Vec<Row>>
where
    F: Fn(Row) -> StoreResult<Vec<Row>> + Sync + Send,
{
    let nested: Vec<Vec<Row>> = if parallel {
        rows.into_par_iter().map(f).collect::<StoreResult<_>>()?
    } else {
        rows.into_iter().map(f).collect::<StoreResult<_>>()?
    };
    Ok(nested.into_iter().flatten().collect())
}

fn lookup(
    cache: &PatternCache,
    store: &dyn FactStore,
    predicate: PredicateId,
    pattern: Vec<Option<u64>>,
) -> StoreResult<Arc<Vec<GroundPredicate>>> {
    if let Some(hit) = cache.get(&pattern) {
        return Ok(Arc::clone(hit.value()));
    }
    let found = Arc::new(store.matching_ground_predicates(predicate, &pattern)?);
    cache.insert(pattern, Arc::clone(&found));
    Ok(found)
}

/// Bind `values` to `arguments` slot by slot; fails on a conflicting binding.
fn unify(values: &mut [Option<u64>], slots: &[usize], arguments: &[u64]) -> bool {
    for (&v, &argument) in slots.iter().zip(arguments) {
        match values[v] {
            Some(bound) if bound != argument => return false,
            Some(_) => {}
            None => values[v] = Some(argument),
        }
    }
    true
}
