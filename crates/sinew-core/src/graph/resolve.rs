//! Dependency resolution: can-start and blocking-set queries plus
//! topological ordering.
//!
//! # Scheduling semantics
//!
//! An item is gated only by its *direct* dependency set. A dependency is
//! satisfied once it reaches `Done` or `Cancelled` (a cancelled
//! prerequisite will never complete, so waiting on it would wedge the
//! dependent forever). The check never recurses transitively: each
//! dependency's own gating was already enforced when it entered a
//! satisfying status.
//!
//! A dependency id whose node no longer exists counts as satisfied —
//! deletion cascades edge removal, so a dangling id can only appear
//! transiently and must not block anything.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::{BTreeSet, HashMap};

use crate::error::{EngineError, Result};
use crate::graph::cycles::{self, CyclePath, EdgeKind};
use crate::graph::store::GraphStore;
use crate::model::item_id::ItemId;

/// `true` iff every direct dependency of `id` is in a satisfying status.
///
/// # Errors
///
/// `NotFound` if `id` is absent.
pub fn can_start(store: &GraphStore, id: &ItemId) -> Result<bool> {
    Ok(blocking_set(store, id)?.is_empty())
}

/// The direct dependencies of `id` not yet in a satisfying status,
/// sorted by id. Empty iff [`can_start`] is `true`.
///
/// # Errors
///
/// `NotFound` if `id` is absent.
pub fn blocking_set(store: &GraphStore, id: &ItemId) -> Result<Vec<ItemId>> {
    let deps = store.dependencies_of(id)?;
    Ok(deps
        .into_iter()
        .filter(|dep| {
            store
                .get(dep)
                .is_some_and(|item| !item.status.satisfies_dependency())
        })
        .collect())
}

/// Would adding dependency edge `from → to` close a cycle? Returns the
/// offending path without mutating anything. The store runs the same
/// check again inside its own mutation, so a stale answer here is
/// harmless.
pub fn would_cycle(store: &GraphStore, from: &ItemId, to: &ItemId) -> Option<CyclePath> {
    cycles::detect_cycle_on_add(store.dependency_index(), from, to, EdgeKind::Dependency)
}

/// All items that could be picked up right now: not archived, not in a
/// terminal status, and with an empty blocking set. Sorted by id.
pub fn ready_items(store: &GraphStore) -> Vec<ItemId> {
    let mut ready: Vec<ItemId> = store
        .ids()
        .filter(|id| {
            store.get(id).is_some_and(|item| {
                !item.is_archived
                    && !item.status.is_terminal()
                    && blocking_set(store, id).map(|b| b.is_empty()).unwrap_or(false)
            })
        })
        .cloned()
        .collect();
    ready.sort();
    ready
}

/// Order `subgraph` so that every item's prerequisites appear before it
/// (Kahn's algorithm over the induced subgraph). Ties break by id so the
/// output is deterministic.
///
/// Dependency edges leaving the subgraph are ignored; batch schedulers
/// pass the closed set they care about.
///
/// # Errors
///
/// - `NotFound` if any id in `subgraph` is absent
/// - `Cycle` if the induced subgraph contains a cycle. Insertion-time
///   checks make this unreachable in normal operation; the failure is a
///   defensive invariant check, not a normal path.
pub fn topological_order(store: &GraphStore, subgraph: &[ItemId]) -> Result<Vec<ItemId>> {
    let members: BTreeSet<&ItemId> = subgraph.iter().collect();
    for id in &members {
        store.get_required(id)?;
    }

    // in-degree = number of prerequisites inside the subgraph
    let mut in_degree: HashMap<&ItemId, usize> = HashMap::new();
    let mut dependents_in: HashMap<&ItemId, Vec<&ItemId>> = HashMap::new();
    let index = store.dependency_index();

    for &id in &members {
        let degree = index
            .get(id)
            .map(|deps| deps.iter().filter(|d| members.contains(d)).count())
            .unwrap_or(0);
        in_degree.insert(id, degree);
        if let Some(deps) = index.get(id) {
            for dep in deps.iter().filter(|d| members.contains(d)) {
                dependents_in.entry(dep).or_default().push(id);
            }
        }
    }

    let mut ready: BTreeSet<&ItemId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order: Vec<ItemId> = Vec::with_capacity(members.len());

    while let Some(next) = ready.pop_first() {
        order.push(next.clone());
        if let Some(dependents) = dependents_in.get(next) {
            for &dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
    }

    if order.len() == members.len() {
        Ok(order)
    } else {
        let leftovers: BTreeSet<&ItemId> = members
            .iter()
            .copied()
            .filter(|id| !order.contains(id))
            .collect();
        Err(EngineError::Cycle {
            path: cycle_among(index, &leftovers),
        })
    }
}

/// Walk dependency edges within `leftovers` until a node repeats. Every
/// leftover of Kahn's algorithm sits on or leads into a cycle, so the walk
/// always closes one.
fn cycle_among(
    index: &cycles::EdgeIndex,
    leftovers: &BTreeSet<&ItemId>,
) -> CyclePath {
    let mut path: Vec<ItemId> = Vec::new();
    let mut seen: HashMap<&ItemId, usize> = HashMap::new();
    let mut current: &ItemId = leftovers
        .iter()
        .next()
        .copied()
        .expect("kahn leftover set is non-empty");

    loop {
        if let Some(&start) = seen.get(current) {
            let mut cycle: Vec<ItemId> = path[start..].to_vec();
            cycle.push(current.clone());
            let edge_from = cycle[0].clone();
            let edge_to = cycle.get(1).cloned().unwrap_or_else(|| cycle[0].clone());
            return CyclePath {
                kind: EdgeKind::Dependency,
                cycle_path: cycle,
                edge_from,
                edge_to,
            };
        }
        seen.insert(current, path.len());
        path.push(current.clone());
        current = index
            .get(current)
            .and_then(|deps| deps.iter().find(|d| leftovers.contains(d)))
            .expect("leftover node must have an in-subgraph prerequisite");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
