//! Canonical SQLite projection schema.
//!
//! The projection is disposable: the in-memory graph is authoritative for
//! a running process, and the database can always be rebuilt from it. The
//! schema is normalized for queryability:
//! - `items` keeps the latest aggregate fields (and version stamp) per node
//! - `item_dependencies` models the dependency edge set
//! - the hierarchy lives on `items.parent_id` (a tree needs no edge table)
//! - `projection_meta` tracks schema version and last rebuild time

/// Migration v1: items, dependency edges, projection metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    kind TEXT NOT NULL CHECK (kind IN (
        'task', 'bug', 'feature', 'improvement', 'epic',
        'story', 'subtask', 'issue', 'migration', 'integration'
    )),
    status TEXT NOT NULL CHECK (status IN (
        'todo', 'in_progress', 'in_review', 'testing', 'done',
        'cancelled', 'blocked', 'on_hold', 'closed'
    )),
    priority TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN (
        'lowest', 'low', 'medium', 'high', 'highest', 'critical'
    )),
    start_date_us INTEGER,
    due_date_us INTEGER,
    completed_at_us INTEGER,
    progress REAL NOT NULL DEFAULT 0 CHECK (progress >= 0 AND progress <= 100),
    estimated_hours REAL,
    actual_hours REAL NOT NULL DEFAULT 0,
    estimated_cost REAL,
    actual_cost REAL NOT NULL DEFAULT 0,
    hourly_rate REAL,
    checklist TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    watchers TEXT NOT NULL DEFAULT '[]',
    attachments TEXT NOT NULL DEFAULT '[]',
    block_reason TEXT,
    is_archived INTEGER NOT NULL DEFAULT 0 CHECK (is_archived IN (0, 1)),
    archived_at_us INTEGER,
    parent_id TEXT REFERENCES items(item_id) ON DELETE SET NULL,
    version INTEGER NOT NULL DEFAULT 0,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    CHECK (item_id LIKE 'sn-%')
);

CREATE TABLE IF NOT EXISTS item_dependencies (
    item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    depends_on_item_id TEXT NOT NULL REFERENCES items(item_id) ON DELETE CASCADE,
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (item_id, depends_on_item_id),
    CHECK (item_id <> depends_on_item_id)
);

CREATE TABLE IF NOT EXISTS projection_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_rebuild_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO projection_meta (id, schema_version, last_rebuild_at_us)
VALUES (1, 1, 0);

CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);
CREATE INDEX IF NOT EXISTS idx_items_due_date ON items(due_date_us);
CREATE INDEX IF NOT EXISTS idx_items_parent ON items(parent_id);
CREATE INDEX IF NOT EXISTS idx_deps_depends_on ON item_dependencies(depends_on_item_id);
";

/// Indexes every migrated database must carry.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_items_status",
    "idx_items_due_date",
    "idx_items_parent",
    "idx_deps_depends_on",
];
