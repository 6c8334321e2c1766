//! The work-item service: the engine's single entry point.
//!
//! # Overview
//!
//! [`WorkItemService`] orchestrates the graph store, the dependency
//! resolver, the lifecycle state machine, and the aggregation functions
//! under one transactional discipline:
//!
//! 1. acquire the write guard (structural changes are serialized — the
//!    cycle check and the edge insertion are observed atomically),
//! 2. validate the intent (resolver + state machine) before any write,
//! 3. apply the change to the in-memory graph (all-or-nothing),
//! 4. write the touched rows through to the SQLite projection, when one
//!    is attached, in a single transaction.
//!
//! Read-only queries take the read guard and return owned snapshots; they
//! tolerate concurrently committing writers (a stale answer is fine, a
//! torn one cannot happen).
//!
//! The in-memory graph is authoritative for a running process. A failed
//! projection write surfaces as [`EngineError::Projection`] after the
//! graph committed; [`WorkItemService::rebuild_projection`] re-dumps the
//! graph to repair the database.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::aggregate;
use crate::config::EngineConfig;
use crate::db;
use crate::db::persist::{self, NodeRow};
use crate::error::{EngineError, Result};
use crate::graph::{hierarchy, resolve, store::GraphStore};
use crate::lifecycle;
use crate::model::item::{
    Attachment, ChecklistEntry, ItemKind, Priority, Status, WorkItem,
};
use crate::model::item_id::ItemId;

// ---------------------------------------------------------------------------
// Drafts and patches
// ---------------------------------------------------------------------------

/// Fields a caller provides when creating an item. Everything except the
/// title is optional.
#[derive(Debug, Clone, Default)]
pub struct NewWorkItem {
    pub title: String,
    pub description: Option<String>,
    pub kind: Option<ItemKind>,
    pub priority: Option<Priority>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub tags: BTreeSet<String>,
}

impl NewWorkItem {
    /// Shorthand draft with just a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A field-level edit. `None` leaves a field alone; for clearable fields
/// the inner option distinguishes "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct WorkItemPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub kind: Option<ItemKind>,
    pub priority: Option<Priority>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub estimated_hours: Option<Option<f64>>,
    pub estimated_cost: Option<Option<f64>>,
    pub hourly_rate: Option<Option<f64>>,
}

/// Node ids a mutation touched: rows to upsert and rows to delete.
#[derive(Debug, Default)]
struct Touched {
    upserts: Vec<ItemId>,
    deletes: Vec<ItemId>,
}

impl Touched {
    fn upsert<const N: usize>(ids: [&ItemId; N]) -> Self {
        Self {
            upserts: ids.iter().map(|id| (*id).clone()).collect(),
            deletes: Vec::new(),
        }
    }
}

// The connection sits behind a Mutex because rusqlite's Connection is Send
// but not Sync, and the service must be shareable across request handlers.
// The mutex is uncontended in practice: writers already hold the RwLock
// write guard.
struct ServiceState {
    graph: GraphStore,
    projection: Option<Mutex<Connection>>,
}

/// The engine facade used by the surrounding CRUD layer.
///
/// Identity/ownership checks are the caller's concern; the service
/// enforces structural and lifecycle invariants only.
pub struct WorkItemService {
    state: RwLock<ServiceState>,
    config: EngineConfig,
}

impl WorkItemService {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// A memory-only engine (no projection).
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: RwLock::new(ServiceState {
                graph: GraphStore::new(),
                projection: None,
            }),
            config,
        }
    }

    /// Open (or create) a projection database at `path` and load the graph
    /// it holds.
    ///
    /// # Errors
    ///
    /// `Projection` if the database cannot be opened, migrated, or loaded.
    pub fn open(config: EngineConfig, path: &Path) -> Result<Self> {
        let conn = db::open_projection(path)?;
        Self::with_connection(config, conn)
    }

    /// Wrap an already-open (and migrated) projection connection, loading
    /// the graph it holds. Useful with [`db::open_in_memory`].
    ///
    /// # Errors
    ///
    /// `Projection` if loading the graph fails.
    pub fn with_connection(config: EngineConfig, conn: Connection) -> Result<Self> {
        let graph = persist::load_graph(&conn)?;
        tracing::info!(items = graph.len(), "loaded graph from projection");
        Ok(Self {
            state: RwLock::new(ServiceState {
                graph,
                projection: Some(Mutex::new(conn)),
            }),
            config,
        })
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wipe and re-dump the projection from the in-memory graph.
    ///
    /// # Errors
    ///
    /// `Projection` on database failures. A no-op without a projection.
    pub fn rebuild_projection(&self) -> Result<()> {
        let mut guard = self.write();
        let ServiceState { graph, projection } = &mut *guard;
        if let Some(conn) = projection.as_ref() {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            persist::rebuild(&mut conn, graph, Utc::now())?;
            tracing::info!(items = graph.len(), "projection rebuilt");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Item CRUD
    // -----------------------------------------------------------------------

    /// Create a new item in `Todo` with progress 0.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty title or negative/non-finite
    /// estimates; `Projection` on write-through failure.
    pub fn create_item(&self, draft: NewWorkItem) -> Result<WorkItem> {
        if draft.title.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "title must not be empty".to_string(),
            ));
        }
        for (label, value) in [
            ("estimated_hours", draft.estimated_hours),
            ("estimated_cost", draft.estimated_cost),
            ("hourly_rate", draft.hourly_rate),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(EngineError::InvalidArgument(format!(
                        "{label} must be a non-negative number, got {v}"
                    )));
                }
            }
        }

        self.mutate(|graph, _, now| {
            let id = ItemId::generate();
            let mut item = WorkItem::new(id.clone(), draft.title.trim(), now);
            item.description = draft.description;
            item.kind = draft.kind.unwrap_or_default();
            item.priority = draft.priority.unwrap_or_default();
            item.start_date = draft.start_date;
            item.due_date = draft.due_date;
            item.estimated_hours = draft.estimated_hours;
            item.estimated_cost = draft.estimated_cost;
            item.hourly_rate = draft.hourly_rate;
            item.tags = draft.tags;

            graph.insert(item.clone())?;
            tracing::info!(id = %id, title = %item.title, "item created");
            Ok((item, Touched::upsert([&id])))
        })
    }

    /// Snapshot of an item.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is absent.
    pub fn get_item(&self, id: &ItemId) -> Result<WorkItem> {
        Ok(self.read().graph.get_required(id)?.clone())
    }

    /// Apply a field-level patch.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, `InvalidArgument` (bad numeric values), or
    /// `Projection`.
    pub fn update_item(&self, id: &ItemId, patch: WorkItemPatch) -> Result<WorkItem> {
        for (label, value) in [
            ("estimated_hours", patch.estimated_hours.flatten()),
            ("estimated_cost", patch.estimated_cost.flatten()),
            ("hourly_rate", patch.hourly_rate.flatten()),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(EngineError::InvalidArgument(format!(
                        "{label} must be a non-negative number, got {v}"
                    )));
                }
            }
        }
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(EngineError::InvalidArgument(
                    "title must not be empty".to_string(),
                ));
            }
        }

        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let updated = graph.update_item(id, |item| {
                if let Some(title) = patch.title {
                    item.title = title.trim().to_string();
                }
                if let Some(description) = patch.description {
                    item.description = description;
                }
                if let Some(kind) = patch.kind {
                    item.kind = kind;
                }
                if let Some(priority) = patch.priority {
                    item.priority = priority;
                }
                if let Some(start_date) = patch.start_date {
                    item.start_date = start_date;
                }
                if let Some(due_date) = patch.due_date {
                    item.due_date = due_date;
                }
                if let Some(estimated_hours) = patch.estimated_hours {
                    item.estimated_hours = estimated_hours;
                }
                if let Some(estimated_cost) = patch.estimated_cost {
                    item.estimated_cost = estimated_cost;
                }
                if let Some(hourly_rate) = patch.hourly_rate {
                    item.hourly_rate = hourly_rate;
                }
                item.updated_at = now;
            })?;
            Ok((updated.clone(), Touched::upsert([id])))
        })
    }

    /// Delete an item. `cascade = None` falls back to the configured
    /// default. Returns every id removed.
    ///
    /// Hierarchy children are reparented to root unless cascading; all
    /// dependency edges referencing deleted nodes are removed with them,
    /// as a single atomic step.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived` (the item, or any subtree member for a
    /// cascade), or `Projection`.
    pub fn delete_item(&self, id: &ItemId, cascade: Option<bool>) -> Result<Vec<ItemId>> {
        let cascade = cascade.unwrap_or(self.config.delete.cascade_children);

        self.mutate(|graph, _, _| {
            // capture the neighborhood before edges disappear
            let doomed: Vec<ItemId> = if cascade {
                graph.subtree_ids(id)
            } else {
                vec![id.clone()]
            };
            let mut survivors: BTreeSet<ItemId> = BTreeSet::new();
            for member in &doomed {
                if !graph.contains(member) {
                    continue;
                }
                survivors.extend(graph.dependencies_of(member)?);
                survivors.extend(graph.dependents_of(member)?);
                survivors.extend(graph.children_of(member)?);
                if let Some(parent) = graph.parent_of(member)? {
                    survivors.insert(parent);
                }
            }

            let deleted = graph.delete_node(id, cascade)?;
            for gone in &deleted {
                survivors.remove(gone);
            }
            tracing::info!(id = %id, cascade, count = deleted.len(), "item deleted");

            Ok((
                deleted.clone(),
                Touched {
                    upserts: survivors.into_iter().collect(),
                    deletes: deleted,
                },
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Structure: dependencies and hierarchy
    // -----------------------------------------------------------------------

    /// Add dependency edge `from → to`. Returns `false` when the edge
    /// already existed.
    ///
    /// # Errors
    ///
    /// `SelfReference`, `NotFound`, `Archived`, `Cycle`, or `Projection`.
    pub fn add_dependency(&self, from: &ItemId, to: &ItemId) -> Result<bool> {
        self.mutate(|graph, _, _| {
            let inserted = graph.add_dependency(from, to)?;
            tracing::debug!(%from, %to, inserted, "dependency added");
            Ok((inserted, Touched::upsert([from, to])))
        })
    }

    /// Remove dependency edge `from → to`. Idempotent.
    ///
    /// # Errors
    ///
    /// `Archived` or `Projection`.
    pub fn remove_dependency(&self, from: &ItemId, to: &ItemId) -> Result<bool> {
        self.mutate(|graph, _, _| {
            let removed = graph.remove_dependency(from, to)?;
            tracing::debug!(%from, %to, removed, "dependency removed");
            let touched = if removed {
                Touched::upsert([from, to])
            } else {
                Touched::default()
            };
            Ok((removed, touched))
        })
    }

    /// Attach `child` under `parent`. Returns `false` when the exact link
    /// already existed.
    ///
    /// # Errors
    ///
    /// `SelfReference`, `NotFound`, `Archived`, `ParentConflict`,
    /// `Cycle`, or `Projection`.
    pub fn add_child(&self, parent: &ItemId, child: &ItemId) -> Result<bool> {
        self.mutate(|graph, _, _| {
            let attached = graph.add_child(parent, child)?;
            tracing::debug!(%parent, %child, attached, "child attached");
            Ok((attached, Touched::upsert([parent, child])))
        })
    }

    /// Detach `child` from `parent`; the child becomes a root. Idempotent.
    ///
    /// # Errors
    ///
    /// `Archived` or `Projection`.
    pub fn remove_child(&self, parent: &ItemId, child: &ItemId) -> Result<bool> {
        self.mutate(|graph, _, _| {
            let detached = graph.remove_child(parent, child)?;
            tracing::debug!(%parent, %child, detached, "child detached");
            let touched = if detached {
                Touched::upsert([parent, child])
            } else {
                Touched::default()
            };
            Ok((detached, touched))
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Transition an item to `to`. The optional `reason` is stashed when
    /// entering `Blocked` and ignored otherwise.
    ///
    /// Entering `InProgress` or `Done` passes the dependency gate first
    /// (when enforcement is configured on).
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, `IllegalTransition`,
    /// `DependencyNotSatisfied` (carrying the blocking set), or
    /// `Projection`.
    pub fn transition(
        &self,
        id: &ItemId,
        to: Status,
        reason: Option<String>,
    ) -> Result<WorkItem> {
        self.mutate(|graph, config, now| {
            let item = Self::require_live(graph, id)?;
            lifecycle::check(item, to)?;
            Self::check_gate(graph, config, id, to)?;

            let from = item.status;
            let updated = graph.update_item(id, |item| lifecycle::apply(item, to, reason, now))?;
            tracing::debug!(%id, %from, %to, "status transition");
            Ok((updated, Touched::upsert([id])))
        })
    }

    /// Set progress, clamped to `[0, 100]`. A value of 100 completes the
    /// item; a partial value on a `Todo` item auto-advances it to
    /// `InProgress` (both subject to the usual legality and gating
    /// checks, and to the progress config toggles).
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, `InvalidArgument` (non-finite input, or a
    /// terminal item), `DependencyNotSatisfied`, or `Projection`.
    pub fn set_progress(&self, id: &ItemId, percent: f64) -> Result<WorkItem> {
        if !percent.is_finite() {
            return Err(EngineError::InvalidArgument(format!(
                "progress must be a finite number, got {percent}"
            )));
        }
        // UI sliders overshoot; out-of-range values clamp rather than fail
        let clamped = percent.clamp(0.0, 100.0);

        self.mutate(|graph, config, now| {
            let item = Self::require_live(graph, id)?;
            if item.status.is_terminal() {
                return Err(EngineError::InvalidArgument(format!(
                    "cannot set progress of '{id}' in terminal status {}",
                    item.status
                )));
            }

            let target = lifecycle::progress_target(item.status, clamped).filter(|t| match t {
                Status::Done => config.progress.auto_complete,
                Status::InProgress => config.progress.auto_advance,
                _ => true,
            });

            if let Some(to) = target {
                lifecycle::check(item, to)?;
                Self::check_gate(graph, config, id, to)?;
                let updated = graph.update_item(id, |item| {
                    lifecycle::apply(item, to, None, now);
                    item.progress = if to == Status::Done { 100.0 } else { clamped };
                })?;
                tracing::debug!(%id, progress = clamped, %to, "progress set with transition");
                Ok((updated, Touched::upsert([id])))
            } else {
                let updated = graph.update_item(id, |item| {
                    item.progress = clamped;
                    item.updated_at = now;
                })?;
                tracing::debug!(%id, progress = clamped, "progress set");
                Ok((updated, Touched::upsert([id])))
            }
        })
    }

    /// Accumulate logged time (and cost) onto an item.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, `InvalidArgument` (negative or non-finite
    /// values), or `Projection`.
    pub fn log_time(
        &self,
        id: &ItemId,
        hours: f64,
        explicit_cost: Option<f64>,
    ) -> Result<WorkItem> {
        self.mutate(|graph, _, now| {
            let item = Self::require_live(graph, id)?;

            // validate against a scratch copy so a rejected log leaves the
            // stored item (and its version) untouched
            let mut scratch = item.clone();
            aggregate::log_time(&mut scratch, hours, explicit_cost)?;
            scratch.updated_at = now;

            let updated = graph.update_item(id, |item| *item = scratch)?;
            tracing::debug!(%id, hours, "time logged");
            Ok((updated, Touched::upsert([id])))
        })
    }

    // -----------------------------------------------------------------------
    // Checklist, tags, watchers, attachments
    // -----------------------------------------------------------------------

    /// Append a checklist entry and return it.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, `InvalidArgument` (empty title), or
    /// `Projection`.
    pub fn add_checklist_item(&self, id: &ItemId, title: &str) -> Result<ChecklistEntry> {
        if title.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "checklist entry title must not be empty".to_string(),
            ));
        }
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut entry = None;
            graph.update_item(id, |item| {
                entry = Some(item.add_checklist_entry(title.trim()));
                item.updated_at = now;
            })?;
            let entry = entry.ok_or_else(|| {
                EngineError::InvalidArgument("checklist entry was not created".to_string())
            })?;
            Ok((entry, Touched::upsert([id])))
        })
    }

    /// Toggle a checklist entry by id.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, `InvalidArgument` (unknown entry id), or
    /// `Projection`.
    pub fn toggle_checklist_item(&self, id: &ItemId, entry_id: &str) -> Result<WorkItem> {
        self.mutate(|graph, _, now| {
            let item = Self::require_live(graph, id)?;
            if !item.checklist.iter().any(|e| e.id == entry_id) {
                return Err(EngineError::InvalidArgument(format!(
                    "no checklist entry '{entry_id}' on item '{id}'"
                )));
            }
            let updated = graph.update_item(id, |item| {
                item.toggle_checklist_entry(entry_id);
                item.updated_at = now;
            })?;
            Ok((updated, Touched::upsert([id])))
        })
    }

    /// Add a tag. Returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, or `Projection`.
    pub fn add_tag(&self, id: &ItemId, tag: &str) -> Result<bool> {
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut added = false;
            graph.update_item(id, |item| {
                added = item.tags.insert(tag.to_string());
                item.updated_at = now;
            })?;
            Ok((added, Touched::upsert([id])))
        })
    }

    /// Remove a tag. Returns `false` if it was absent.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, or `Projection`.
    pub fn remove_tag(&self, id: &ItemId, tag: &str) -> Result<bool> {
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut removed = false;
            graph.update_item(id, |item| {
                removed = item.tags.remove(tag);
                item.updated_at = now;
            })?;
            Ok((removed, Touched::upsert([id])))
        })
    }

    /// Register a watcher. Returns `false` if already watching.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, or `Projection`.
    pub fn add_watcher(&self, id: &ItemId, user_id: &str) -> Result<bool> {
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut added = false;
            graph.update_item(id, |item| {
                added = item.add_watcher(user_id);
                item.updated_at = now;
            })?;
            Ok((added, Touched::upsert([id])))
        })
    }

    /// Remove a watcher. Returns `false` if not watching.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, or `Projection`.
    pub fn remove_watcher(&self, id: &ItemId, user_id: &str) -> Result<bool> {
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut removed = false;
            graph.update_item(id, |item| {
                removed = item.remove_watcher(user_id);
                item.updated_at = now;
            })?;
            Ok((removed, Touched::upsert([id])))
        })
    }

    /// Attach file metadata and return the stored attachment.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, or `Projection`.
    pub fn add_attachment(
        &self,
        id: &ItemId,
        name: &str,
        url: &str,
        size: u64,
        mime_type: &str,
    ) -> Result<Attachment> {
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut attachment = None;
            graph.update_item(id, |item| {
                attachment = Some(item.add_attachment(name, url, size, mime_type, now));
                item.updated_at = now;
            })?;
            let attachment = attachment.ok_or_else(|| {
                EngineError::InvalidArgument("attachment was not created".to_string())
            })?;
            Ok((attachment, Touched::upsert([id])))
        })
    }

    /// Remove an attachment by id. Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Archived`, or `Projection`.
    pub fn remove_attachment(&self, id: &ItemId, attachment_id: &str) -> Result<bool> {
        self.mutate(|graph, _, now| {
            Self::require_live(graph, id)?;
            let mut removed = false;
            graph.update_item(id, |item| {
                removed = item.remove_attachment(attachment_id);
                item.updated_at = now;
            })?;
            Ok((removed, Touched::upsert([id])))
        })
    }

    // -----------------------------------------------------------------------
    // Archive
    // -----------------------------------------------------------------------

    /// Archive an item, freezing it against further mutation. Idempotent.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Projection`.
    pub fn archive(&self, id: &ItemId) -> Result<WorkItem> {
        self.mutate(|graph, _, now| {
            let item = graph.get_required(id)?;
            if item.is_archived {
                return Ok((item.clone(), Touched::default()));
            }
            let updated = graph.update_item(id, |item| {
                item.is_archived = true;
                item.archived_at = Some(now);
                item.updated_at = now;
            })?;
            tracing::info!(%id, "item archived");
            Ok((updated, Touched::upsert([id])))
        })
    }

    /// Restore an archived item. Idempotent.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Projection`.
    pub fn restore(&self, id: &ItemId) -> Result<WorkItem> {
        self.mutate(|graph, _, now| {
            let item = graph.get_required(id)?;
            if !item.is_archived {
                return Ok((item.clone(), Touched::default()));
            }
            let updated = graph.update_item(id, |item| {
                item.is_archived = false;
                item.archived_at = None;
                item.updated_at = now;
            })?;
            tracing::info!(%id, "item restored");
            Ok((updated, Touched::upsert([id])))
        })
    }

    // -----------------------------------------------------------------------
    // Queries (read guard, owned snapshots)
    // -----------------------------------------------------------------------

    /// `true` iff every direct dependency is satisfied.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn can_start(&self, id: &ItemId) -> Result<bool> {
        resolve::can_start(&self.read().graph, id)
    }

    /// Direct dependencies not yet satisfied, sorted by id.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn blocking_set(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        resolve::blocking_set(&self.read().graph, id)
    }

    /// Items ready to be picked up (unarchived, non-terminal, ungated).
    #[must_use]
    pub fn ready_items(&self) -> Vec<ItemId> {
        resolve::ready_items(&self.read().graph)
    }

    /// Items currently overdue, sorted by id.
    #[must_use]
    pub fn overdue_items(&self) -> Vec<ItemId> {
        let guard = self.read();
        let now = Utc::now();
        let mut overdue: Vec<ItemId> = guard
            .graph
            .ids()
            .filter(|id| {
                guard
                    .graph
                    .get(id)
                    .is_some_and(|item| aggregate::is_overdue(item, now))
            })
            .cloned()
            .collect();
        overdue.sort();
        overdue
    }

    /// Dependency-respecting order over `subgraph` (or the whole graph
    /// when `None`).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; `Cycle` only if the store was corrupted
    /// outside the engine.
    pub fn topological_order(&self, subgraph: Option<&[ItemId]>) -> Result<Vec<ItemId>> {
        let guard = self.read();
        match subgraph {
            Some(ids) => resolve::topological_order(&guard.graph, ids),
            None => {
                let all: Vec<ItemId> = guard.graph.ids().cloned().collect();
                resolve::topological_order(&guard.graph, &all)
            }
        }
    }

    /// Direct prerequisites of an item.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn dependencies_of(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        self.read().graph.dependencies_of(id)
    }

    /// Items that directly depend on `id`.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn dependents_of(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        self.read().graph.dependents_of(id)
    }

    /// The item's parent, if any.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn parent_of(&self, id: &ItemId) -> Result<Option<ItemId>> {
        self.read().graph.parent_of(id)
    }

    /// Direct children of an item.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn children_of(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        self.read().graph.children_of(id)
    }

    /// The subtree rooted at `id`, BFS order, root first.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn subtree(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        hierarchy::subtree(&self.read().graph, id)
    }

    /// Ancestors of `id`, immediate parent first.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn ancestors(&self, id: &ItemId) -> Result<Vec<ItemId>> {
        hierarchy::ancestors(&self.read().graph, id)
    }

    /// Current optimistic version stamp of an item.
    ///
    /// # Errors
    ///
    /// `NotFound`.
    pub fn version(&self, id: &ItemId) -> Result<u64> {
        let guard = self.read();
        guard.graph.get_required(id)?;
        Ok(guard.graph.version(id).unwrap_or(0))
    }

    /// Number of items in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().graph.len()
    }

    /// `true` when the graph holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().graph.is_empty()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, ServiceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ServiceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one mutation under the write guard: validate + apply against
    /// the graph, then write the touched rows through to the projection.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut GraphStore, &EngineConfig, DateTime<Utc>) -> Result<(T, Touched)>,
    ) -> Result<T> {
        let now = Utc::now();
        let mut guard = self.write();
        let ServiceState { graph, projection } = &mut *guard;

        let (value, touched) = op(graph, &self.config, now)?;

        if let Some(conn) = projection.as_ref() {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = Self::project(&mut conn, graph, &touched) {
                tracing::warn!(error = %err, "projection write failed; graph stays authoritative");
                return Err(EngineError::Projection(err));
            }
        }

        Ok(value)
    }

    /// Write the touched rows in one projection transaction.
    fn project(
        conn: &mut Connection,
        graph: &GraphStore,
        touched: &Touched,
    ) -> anyhow::Result<()> {
        if touched.upserts.is_empty() && touched.deletes.is_empty() {
            return Ok(());
        }

        let mut seen: BTreeSet<&ItemId> = BTreeSet::new();
        let mut owned: Vec<(WorkItem, u64, Option<ItemId>, Vec<ItemId>)> = Vec::new();
        for id in &touched.upserts {
            if !seen.insert(id) {
                continue;
            }
            let Some(item) = graph.get(id) else {
                continue; // deleted in the same mutation
            };
            let version = graph.version(id).unwrap_or(0);
            let parent = graph.parent_of(id).unwrap_or(None);
            let deps = graph.dependencies_of(id).unwrap_or_default();
            owned.push((item.clone(), version, parent, deps));
        }

        let rows: Vec<NodeRow<'_>> = owned
            .iter()
            .map(|(item, version, parent, deps)| NodeRow {
                item,
                version: *version,
                parent: parent.as_ref(),
                deps,
            })
            .collect();

        persist::apply_mutation(conn, &rows, &touched.deletes)
    }

    /// The item, guaranteed unarchived.
    fn require_live<'g>(graph: &'g GraphStore, id: &ItemId) -> Result<&'g WorkItem> {
        let item = graph.get_required(id)?;
        if item.is_archived {
            return Err(EngineError::Archived(id.clone()));
        }
        Ok(item)
    }

    /// Dependency gate for transitions into `InProgress`/`Done`.
    fn check_gate(
        graph: &GraphStore,
        config: &EngineConfig,
        id: &ItemId,
        to: Status,
    ) -> Result<()> {
        if !config.gate.enforce_dependencies || !lifecycle::requires_gate(to) {
            return Ok(());
        }
        let blocking = resolve::blocking_set(graph, id)?;
        if blocking.is_empty() {
            Ok(())
        } else {
            Err(EngineError::DependencyNotSatisfied {
                id: id.clone(),
                blocking,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
