//! Parent-child containment queries.
//!
//! The hierarchy is a tree over the same nodes as the dependency graph but
//! with its own edge set; edges in one structure imply nothing about the
//! other. Mutation (attach, detach, reparent validation) lives on
//! [`GraphStore`]; this module answers the read-side questions:
//!
//! - What is the full subtree of an item?
//! - What are an item's ancestors?
//! - Is one item a descendant of another?
//!
//! Aggregation deliberately does not traverse this tree: an item's metrics
//! are local, and rollups are a caller concern.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::HashSet;

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::model::item_id::ItemId;

/// All ids in the subtree rooted at `root`, including `root` itself, in
/// BFS order (root first).
///
/// # Errors
///
/// `NotFound` if `root` is absent.
pub fn subtree(store: &GraphStore, root: &ItemId) -> Result<Vec<ItemId>> {
    store.get_required(root)?;
    Ok(store.subtree_ids(root))
}

/// The ancestor chain of `id`, immediate parent first, root last. Empty if
/// the item is a root. A repeated id truncates the walk (cycle guard for
/// malformed trees; a validated tree cannot trip it).
///
/// # Errors
///
/// `NotFound` if `id` is absent.
pub fn ancestors(store: &GraphStore, id: &ItemId) -> Result<Vec<ItemId>> {
    store.get_required(id)?;

    let mut chain: Vec<ItemId> = Vec::new();
    let mut visited: HashSet<ItemId> = HashSet::new();
    visited.insert(id.clone());

    let mut current = store.parent_of(id)?;
    while let Some(parent) = current {
        if !visited.insert(parent.clone()) {
            break;
        }
        current = store.parent_of(&parent).unwrap_or(None);
        chain.push(parent);
    }

    Ok(chain)
}

/// `true` iff `candidate` appears in the subtree rooted at `root`
/// (an item is not its own descendant).
///
/// # Errors
///
/// `NotFound` if either id is absent.
pub fn is_descendant(store: &GraphStore, root: &ItemId, candidate: &ItemId) -> Result<bool> {
    store.get_required(candidate)?;
    let sub = subtree(store, root)?;
    Ok(candidate != root && sub.contains(candidate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
