//! Row mapping between the in-memory graph and the SQLite projection.
//!
//! All functions take typed structs and return `anyhow::Result` with
//! context strings, never raw rows. Writes run inside a single
//! transaction per engine mutation; `load_graph` and `rebuild` convert a
//! whole database to/from a [`GraphStore`].

#![allow(clippy::module_name_repetitions)]

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::str::FromStr;

use crate::graph::cycles;
use crate::graph::store::GraphStore;
use crate::model::item::{ItemKind, Priority, Status, WorkItem};
use crate::model::item_id::ItemId;

/// One node's projection payload: the item plus the structure the `items`
/// row and `item_dependencies` rows need.
#[derive(Debug, Clone)]
pub struct NodeRow<'a> {
    pub item: &'a WorkItem,
    pub version: u64,
    pub parent: Option<&'a ItemId>,
    pub deps: &'a [ItemId],
}

/// Apply one engine mutation to the projection in a single transaction:
/// delete rows for removed nodes, then upsert every touched survivor and
/// replace its dependency rows.
///
/// # Errors
///
/// Returns an error if any statement fails; the transaction rolls back.
pub fn apply_mutation(
    conn: &mut Connection,
    upserts: &[NodeRow<'_>],
    deletes: &[ItemId],
) -> Result<()> {
    let tx = conn.transaction().context("begin projection transaction")?;

    for id in deletes {
        tx.execute("DELETE FROM items WHERE item_id = ?1", params![id.as_str()])
            .with_context(|| format!("delete projection row '{id}'"))?;
    }

    for row in upserts {
        upsert_item(&tx, row).with_context(|| format!("upsert projection row '{}'", row.item.id))?;
        replace_dependencies(&tx, &row.item.id, row.deps)
            .with_context(|| format!("replace dependency rows for '{}'", row.item.id))?;
    }

    tx.commit().context("commit projection transaction")
}

/// Load the whole projection into a fresh [`GraphStore`].
///
/// Runs a defensive invariant check after loading: a cycle in either edge
/// set means the database was corrupted outside the engine.
///
/// # Errors
///
/// Returns an error on query failures, unparseable rows, or a corrupted
/// edge set.
pub fn load_graph(conn: &Connection) -> Result<GraphStore> {
    let mut graph = GraphStore::new();
    let mut parents: Vec<(ItemId, ItemId)> = Vec::new();

    {
        let mut stmt = conn
            .prepare(
                "SELECT item_id, title, description, kind, status, priority,
                        start_date_us, due_date_us, completed_at_us, progress,
                        estimated_hours, actual_hours, estimated_cost, actual_cost,
                        hourly_rate, checklist, tags, watchers, attachments,
                        block_reason, is_archived, archived_at_us, parent_id,
                        version, created_at_us, updated_at_us
                 FROM items",
            )
            .context("prepare items query")?;
        let mut rows = stmt.query([]).context("query items")?;

        while let Some(row) = rows.next().context("read items row")? {
            let (item, version, parent) = item_from_row(row)?;
            if let Some(parent) = parent {
                parents.push((item.id.clone(), parent));
            }
            graph.restore_node(item, version);
        }
    }

    for (child, parent) in parents {
        graph.restore_parent(child, parent);
    }

    {
        let mut stmt = conn
            .prepare("SELECT item_id, depends_on_item_id FROM item_dependencies")
            .context("prepare dependencies query")?;
        let mut rows = stmt.query([]).context("query dependencies")?;

        while let Some(row) = rows.next().context("read dependency row")? {
            let from: String = row.get(0).context("dependency item_id")?;
            let to: String = row.get(1).context("dependency target")?;
            graph.restore_dependency(ItemId::new_unchecked(&from), ItemId::new_unchecked(&to));
        }
    }

    if cycles::has_cycles(graph.dependency_index()) {
        bail!("projection is corrupt: dependency edge set contains a cycle");
    }
    if cycles::has_cycles(graph.hierarchy_index()) {
        bail!("projection is corrupt: hierarchy edge set contains a cycle");
    }

    Ok(graph)
}

/// Wipe the projection and re-dump the entire graph, stamping
/// `projection_meta.last_rebuild_at_us`.
///
/// # Errors
///
/// Returns an error if any statement fails; the transaction rolls back.
pub fn rebuild(conn: &mut Connection, graph: &GraphStore, now: DateTime<Utc>) -> Result<()> {
    let tx = conn.transaction().context("begin rebuild transaction")?;

    tx.execute("DELETE FROM item_dependencies", [])
        .context("clear dependency rows")?;
    tx.execute("UPDATE items SET parent_id = NULL", [])
        .context("clear parent links")?;
    tx.execute("DELETE FROM items", []).context("clear item rows")?;

    // items first with parents null, then parent links, then edges — every
    // foreign key target exists by the time it is referenced
    for (item, version, _) in graph.iter() {
        upsert_item(
            &tx,
            &NodeRow {
                item,
                version,
                parent: None,
                deps: &[],
            },
        )
        .with_context(|| format!("rebuild item row '{}'", item.id))?;
    }

    for (item, _, parent) in graph.iter() {
        if let Some(parent) = parent {
            tx.execute(
                "UPDATE items SET parent_id = ?1 WHERE item_id = ?2",
                params![parent.as_str(), item.id.as_str()],
            )
            .with_context(|| format!("rebuild parent link for '{}'", item.id))?;
        }
    }

    for (item, _, _) in graph.iter() {
        if let Some(deps) = graph.dependency_index().get(&item.id) {
            for dep in deps {
                tx.execute(
                    "INSERT INTO item_dependencies (item_id, depends_on_item_id, created_at_us)
                     VALUES (?1, ?2, ?3)",
                    params![item.id.as_str(), dep.as_str(), now.timestamp_micros()],
                )
                .with_context(|| format!("rebuild dependency rows for '{}'", item.id))?;
            }
        }
    }

    tx.execute(
        "UPDATE projection_meta SET last_rebuild_at_us = ?1 WHERE id = 1",
        params![now.timestamp_micros()],
    )
    .context("stamp rebuild time")?;

    tx.commit().context("commit rebuild transaction")
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn upsert_item(conn: &Connection, row: &NodeRow<'_>) -> Result<()> {
    let item = row.item;
    let checklist = serde_json::to_string(&item.checklist).context("encode checklist")?;
    let tags = serde_json::to_string(&item.tags).context("encode tags")?;
    let watchers = serde_json::to_string(&item.watchers).context("encode watchers")?;
    let attachments = serde_json::to_string(&item.attachments).context("encode attachments")?;

    conn.execute(
        "INSERT INTO items (
            item_id, title, description, kind, status, priority,
            start_date_us, due_date_us, completed_at_us, progress,
            estimated_hours, actual_hours, estimated_cost, actual_cost,
            hourly_rate, checklist, tags, watchers, attachments,
            block_reason, is_archived, archived_at_us, parent_id,
            version, created_at_us, updated_at_us
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26
        )
        ON CONFLICT(item_id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            kind = excluded.kind,
            status = excluded.status,
            priority = excluded.priority,
            start_date_us = excluded.start_date_us,
            due_date_us = excluded.due_date_us,
            completed_at_us = excluded.completed_at_us,
            progress = excluded.progress,
            estimated_hours = excluded.estimated_hours,
            actual_hours = excluded.actual_hours,
            estimated_cost = excluded.estimated_cost,
            actual_cost = excluded.actual_cost,
            hourly_rate = excluded.hourly_rate,
            checklist = excluded.checklist,
            tags = excluded.tags,
            watchers = excluded.watchers,
            attachments = excluded.attachments,
            block_reason = excluded.block_reason,
            is_archived = excluded.is_archived,
            archived_at_us = excluded.archived_at_us,
            parent_id = excluded.parent_id,
            version = excluded.version,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us",
        params![
            item.id.as_str(),
            item.title,
            item.description,
            item.kind.to_string(),
            item.status.to_string(),
            item.priority.to_string(),
            item.start_date.map(|d| d.timestamp_micros()),
            item.due_date.map(|d| d.timestamp_micros()),
            item.completed_at.map(|d| d.timestamp_micros()),
            item.progress,
            item.estimated_hours,
            item.actual_hours,
            item.estimated_cost,
            item.actual_cost,
            item.hourly_rate,
            checklist,
            tags,
            watchers,
            attachments,
            item.block_reason,
            i64::from(item.is_archived),
            item.archived_at.map(|d| d.timestamp_micros()),
            row.parent.map(ItemId::as_str),
            i64::try_from(row.version).unwrap_or(i64::MAX),
            item.created_at.timestamp_micros(),
            item.updated_at.timestamp_micros(),
        ],
    )
    .context("execute items upsert")?;
    Ok(())
}

fn replace_dependencies(conn: &Connection, id: &ItemId, deps: &[ItemId]) -> Result<()> {
    conn.execute(
        "DELETE FROM item_dependencies WHERE item_id = ?1",
        params![id.as_str()],
    )
    .context("clear old dependency rows")?;

    let now_us = Utc::now().timestamp_micros();
    for dep in deps {
        conn.execute(
            "INSERT INTO item_dependencies (item_id, depends_on_item_id, created_at_us)
             VALUES (?1, ?2, ?3)",
            params![id.as_str(), dep.as_str(), now_us],
        )
        .context("insert dependency row")?;
    }
    Ok(())
}

fn item_from_row(row: &Row<'_>) -> Result<(WorkItem, u64, Option<ItemId>)> {
    let raw_id: String = row.get(0).context("item_id")?;
    let id = ItemId::new_unchecked(&raw_id);

    let kind_raw: String = row.get(3).context("kind")?;
    let status_raw: String = row.get(4).context("status")?;
    let priority_raw: String = row.get(5).context("priority")?;

    let checklist_raw: String = row.get(15).context("checklist")?;
    let tags_raw: String = row.get(16).context("tags")?;
    let watchers_raw: String = row.get(17).context("watchers")?;
    let attachments_raw: String = row.get(18).context("attachments")?;

    let version_raw: i64 = row.get(23).context("version")?;
    let parent: Option<String> = row.get(22).context("parent_id")?;

    let item = WorkItem {
        id,
        title: row.get(1).context("title")?,
        description: row.get(2).context("description")?,
        kind: ItemKind::from_str(&kind_raw)
            .with_context(|| format!("parse kind '{kind_raw}'"))?,
        status: Status::from_str(&status_raw)
            .with_context(|| format!("parse status '{status_raw}'"))?,
        priority: Priority::from_str(&priority_raw)
            .with_context(|| format!("parse priority '{priority_raw}'"))?,
        start_date: micros_opt(row.get(6).context("start_date_us")?)?,
        due_date: micros_opt(row.get(7).context("due_date_us")?)?,
        completed_at: micros_opt(row.get(8).context("completed_at_us")?)?,
        progress: row.get(9).context("progress")?,
        estimated_hours: row.get(10).context("estimated_hours")?,
        actual_hours: row.get(11).context("actual_hours")?,
        estimated_cost: row.get(12).context("estimated_cost")?,
        actual_cost: row.get(13).context("actual_cost")?,
        hourly_rate: row.get(14).context("hourly_rate")?,
        checklist: serde_json::from_str(&checklist_raw).context("decode checklist")?,
        tags: serde_json::from_str(&tags_raw).context("decode tags")?,
        watchers: serde_json::from_str(&watchers_raw).context("decode watchers")?,
        attachments: serde_json::from_str(&attachments_raw).context("decode attachments")?,
        block_reason: row.get(19).context("block_reason")?,
        is_archived: row.get::<_, i64>(20).context("is_archived")? != 0,
        archived_at: micros_opt(row.get(21).context("archived_at_us")?)?,
        created_at: micros(row.get(24).context("created_at_us")?)?,
        updated_at: micros(row.get(25).context("updated_at_us")?)?,
    };

    let version = u64::try_from(version_raw).unwrap_or(0);
    Ok((item, version, parent.map(|p| ItemId::new_unchecked(&p))))
}

fn micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .with_context(|| format!("timestamp out of range: {us}"))
}

fn micros_opt(us: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    us.map(micros).transpose()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{NodeRow, apply_mutation, load_graph, rebuild};
    use crate::db::open_in_memory;
    use crate::graph::store::GraphStore;
    use crate::model::item::{Status, WorkItem};
    use crate::model::item_id::ItemId;
    use chrono::{TimeZone, Utc};

    fn id(raw: &str) -> ItemId {
        ItemId::new_unchecked(raw)
    }

    /// A graph with structure worth round-tripping:
    /// b depends on a; p is parent of a.
    fn sample_graph() -> GraphStore {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("ts");
        let mut graph = GraphStore::new();
        for raw in ["sn-a", "sn-b", "sn-p"] {
            graph
                .insert(WorkItem::new(id(raw), format!("Item {raw}"), now))
                .expect("insert");
        }
        graph
            .update_item(&id("sn-a"), |item| {
                item.status = Status::InProgress;
                item.progress = 40.0;
                item.hourly_rate = Some(12.5);
                item.tags.insert("backend".to_string());
                item.add_watcher("alice");
                item.add_checklist_entry("step one");
            })
            .expect("update");
        graph.add_dependency(&id("sn-b"), &id("sn-a")).expect("b->a");
        graph.add_child(&id("sn-p"), &id("sn-a")).expect("p/a");
        graph
    }

    #[test]
    fn rebuild_then_load_roundtrips() {
        let graph = sample_graph();
        let mut conn = open_in_memory().expect("open");

        rebuild(&mut conn, &graph, Utc::now()).expect("rebuild");
        let loaded = load_graph(&conn).expect("load");

        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(&id("sn-a")), graph.get(&id("sn-a")));
        assert_eq!(loaded.get(&id("sn-b")), graph.get(&id("sn-b")));
        assert_eq!(loaded.version(&id("sn-a")), graph.version(&id("sn-a")));
        assert_eq!(
            loaded.dependencies_of(&id("sn-b")).expect("deps"),
            vec![id("sn-a")]
        );
        assert_eq!(
            loaded.parent_of(&id("sn-a")).expect("parent"),
            Some(id("sn-p"))
        );
    }

    #[test]
    fn rebuild_is_idempotent() {
        let graph = sample_graph();
        let mut conn = open_in_memory().expect("open");

        rebuild(&mut conn, &graph, Utc::now()).expect("first");
        rebuild(&mut conn, &graph, Utc::now()).expect("second");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 3);
    }

    #[test]
    fn apply_mutation_upserts_and_deletes() {
        let graph = sample_graph();
        let mut conn = open_in_memory().expect("open");
        rebuild(&mut conn, &graph, Utc::now()).expect("rebuild");

        // delete sn-b, re-upsert sn-a with a new title
        let mut graph2 = graph.clone();
        graph2.delete_node(&id("sn-b"), false).expect("delete");
        let updated = graph2
            .update_item(&id("sn-a"), |item| item.title = "Renamed".to_string())
            .expect("update");

        let deps: Vec<(ItemId, Vec<ItemId>)> = vec![(id("sn-a"), vec![])];
        let rows = [NodeRow {
            item: &updated,
            version: graph2.version(&id("sn-a")).expect("version"),
            parent: Some(&id("sn-p")),
            deps: deps[0].1.as_slice(),
        }];
        apply_mutation(&mut conn, &rows, &[id("sn-b")]).expect("apply");

        let loaded = load_graph(&conn).expect("load");
        assert_eq!(loaded.len(), 2);
        assert!(loaded.get(&id("sn-b")).is_none());
        assert_eq!(
            loaded.get(&id("sn-a")).map(|i| i.title.clone()),
            Some("Renamed".to_string())
        );

        // FK cascade removed sn-b's dependency rows
        let edge_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM item_dependencies", [], |row| row.get(0))
            .expect("count");
        assert_eq!(edge_count, 0);
    }

    #[test]
    fn corrupt_cycle_is_rejected_on_load() {
        let mut graph = GraphStore::new();
        let now = Utc::now();
        for raw in ["sn-a", "sn-b"] {
            graph
                .insert(WorkItem::new(id(raw), raw.to_string(), now))
                .expect("insert");
        }
        // bypass validation to write a corrupt edge set
        graph.restore_dependency(id("sn-a"), id("sn-b"));
        graph.restore_dependency(id("sn-b"), id("sn-a"));

        let mut conn = open_in_memory().expect("open");
        rebuild(&mut conn, &graph, Utc::now()).expect("rebuild");

        let err = load_graph(&conn).expect_err("corrupt");
        assert!(err.to_string().contains("cycle"), "err: {err}");
    }
}
