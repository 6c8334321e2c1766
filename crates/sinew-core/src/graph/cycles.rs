//! Cycle detection for the dependency and hierarchy edge sets.
//!
//! # Overview
//!
//! Dependency edges form a directed graph. A cycle would make every item on
//! it permanently unstartable (each waits on another in the loop), so edge
//! insertion is *rejected* when it would close one — the check runs before
//! any index is touched, and the caller receives the offending path.
//!
//! # Design
//!
//! - **DFS-based**: depth-first search from the target of the new edge,
//!   looking for a path back to the source. This finds exactly the cycle
//!   the new edge would close.
//! - **Id-keyed**: the search walks adjacency maps keyed by [`ItemId`],
//!   never live object references.
//! - **O(V+E)**: each node and edge is visited at most once per check.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::model::item_id::ItemId;

/// Adjacency index shape shared by both edge sets: node → set of targets.
pub type EdgeIndex = HashMap<ItemId, BTreeSet<ItemId>>;

/// Which edge set a cycle was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Dependency,
    Hierarchy,
}

impl EdgeKind {
    const fn noun(self) -> &'static str {
        match self {
            Self::Dependency => "dependency",
            Self::Hierarchy => "hierarchy",
        }
    }
}

// ---------------------------------------------------------------------------
// CyclePath
// ---------------------------------------------------------------------------

/// The cycle a rejected edge would have closed.
///
/// `cycle_path` starts at the source of the rejected edge, follows existing
/// edges, and ends at the source again: rejecting A→B that would close
/// A→B→C→A yields `["A", "B", "C", "A"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath {
    pub kind: EdgeKind,
    pub cycle_path: Vec<ItemId>,
    /// Source of the rejected edge.
    pub edge_from: ItemId,
    /// Target of the rejected edge.
    pub edge_to: ItemId,
}

impl CyclePath {
    /// Number of distinct items on the cycle (path length minus the
    /// repeated start node).
    pub fn cycle_len(&self) -> usize {
        self.cycle_path.len().saturating_sub(1)
    }

    /// `true` if the rejected edge was a self-loop.
    pub fn is_self_loop(&self) -> bool {
        self.edge_from == self.edge_to
    }

    /// `true` for a 2-node cycle (A↔B).
    pub fn is_mutual(&self) -> bool {
        self.cycle_len() == 2
    }
}

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = self.kind.noun();
        if self.is_self_loop() {
            write!(f, "{noun} cycle: self-loop on '{}'", self.edge_from)
        } else if self.is_mutual() {
            write!(
                f,
                "{noun} cycle: mutual edge between '{}' and '{}'",
                self.edge_from, self.edge_to
            )
        } else {
            let rendered: Vec<&str> = self.cycle_path.iter().map(ItemId::as_str).collect();
            write!(
                f,
                "{noun} cycle ({} items): {}",
                self.cycle_len(),
                rendered.join(" -> ")
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Core detection
// ---------------------------------------------------------------------------

/// Detect whether adding edge `from → to` would create a cycle, given the
/// current adjacency index (before the edge is added).
///
/// The edge closes a cycle exactly when a path `to → ... → from` already
/// exists, so the search starts at `to` and hunts for `from`.
///
/// Returns `Some(CyclePath)` describing the would-be cycle, or `None` if
/// the edge is safe.
pub fn detect_cycle_on_add(
    edges: &EdgeIndex,
    from: &ItemId,
    to: &ItemId,
    kind: EdgeKind,
) -> Option<CyclePath> {
    if from == to {
        return Some(CyclePath {
            kind,
            cycle_path: vec![from.clone(), from.clone()],
            edge_from: from.clone(),
            edge_to: to.clone(),
        });
    }

    let mut visited: HashSet<ItemId> = HashSet::new();
    let mut parent_map: HashMap<ItemId, ItemId> = HashMap::new();

    if dfs_find_path(edges, to, from, &mut visited, &mut parent_map) {
        let mut path = vec![from.clone()];
        reconstruct_path(&parent_map, to, from, &mut path);

        Some(CyclePath {
            kind,
            cycle_path: path,
            edge_from: from.clone(),
            edge_to: to.clone(),
        })
    } else {
        None
    }
}

/// Check whether the adjacency index already contains any cycle.
///
/// Normal operation can never produce one (insertion is guarded), so this
/// is an invariant check for tests and defensive callers. O(V+E),
/// short-circuits on the first back edge.
pub fn has_cycles(edges: &EdgeIndex) -> bool {
    let mut color: HashMap<&ItemId, Color> = HashMap::new();

    for node in edges.keys() {
        if !matches!(color.get(node), Some(Color::Black)) && dfs_has_cycle(edges, node, &mut color)
        {
            return true;
        }
    }

    false
}

// ---------------------------------------------------------------------------
// DFS internals
// ---------------------------------------------------------------------------

/// DFS colors for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Currently on the DFS stack.
    Gray,
    /// Fully processed.
    Black,
}

/// DFS from `current` toward `target`, recording the traversal so the path
/// can be reconstructed. Returns `true` if `target` is reachable.
fn dfs_find_path(
    edges: &EdgeIndex,
    current: &ItemId,
    target: &ItemId,
    visited: &mut HashSet<ItemId>,
    parent_map: &mut HashMap<ItemId, ItemId>,
) -> bool {
    if current == target {
        return true;
    }

    if !visited.insert(current.clone()) {
        return false;
    }

    if let Some(neighbors) = edges.get(current) {
        for neighbor in neighbors {
            if !visited.contains(neighbor) {
                parent_map.insert(neighbor.clone(), current.clone());
                if dfs_find_path(edges, neighbor, target, visited, parent_map) {
                    return true;
                }
            }
        }
    }

    false
}

/// Reconstruct the path from `start` to `end` using the parent map and
/// append it to `path` (which already holds the rejected edge's source).
fn reconstruct_path(
    parent_map: &HashMap<ItemId, ItemId>,
    start: &ItemId,
    end: &ItemId,
    path: &mut Vec<ItemId>,
) {
    let mut chain: Vec<ItemId> = Vec::new();
    let mut current = end.clone();

    while &current != start {
        chain.push(current.clone());
        match parent_map.get(&current) {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }

    chain.push(start.clone());
    chain.reverse();

    let skip = usize::from(path.last() == Some(start));
    for node in chain.into_iter().skip(skip) {
        path.push(node);
    }
}

/// DFS that returns `true` as soon as any back edge is found.
fn dfs_has_cycle<'a>(
    edges: &'a EdgeIndex,
    node: &'a ItemId,
    color: &mut HashMap<&'a ItemId, Color>,
) -> bool {
    color.insert(node, Color::Gray);

    if let Some(neighbors) = edges.get(node) {
        for neighbor in neighbors {
            match color.get(neighbor) {
                None => {
                    if dfs_has_cycle(edges, neighbor, color) {
                        return true;
                    }
                }
                Some(Color::Gray) => return true,
                Some(Color::Black) => {}
            }
        }
    }

    color.insert(node, Color::Black);
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
