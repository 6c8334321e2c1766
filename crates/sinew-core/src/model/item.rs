use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};
use uuid::Uuid;

use crate::model::item_id::ItemId;

/// The closed set of lifecycle statuses.
///
/// `Todo` is the initial status. `Done`, `Cancelled`, and `Closed` are
/// terminal: their only outbound transition is an explicit reopen. The
/// legal transitions live in [`crate::lifecycle`]; nothing outside that
/// table is ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    InReview,
    Testing,
    Done,
    Cancelled,
    Blocked,
    OnHold,
    Closed,
}

impl Status {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Testing => "testing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
            Self::OnHold => "on_hold",
            Self::Closed => "closed",
        }
    }

    /// Terminal statuses permit no outbound transition except reopen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Closed)
    }

    /// A dependency in a satisfying status no longer blocks its dependents.
    /// Cancelled prerequisites count: a cancelled item will never complete,
    /// so waiting on it would wedge the dependent forever.
    #[must_use]
    pub const fn satisfies_dependency(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Scheduling priority, lowest to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Medium,
    High,
    Highest,
    Critical,
}

impl Priority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Highest => "highest",
            Self::Critical => "critical",
        }
    }
}

/// The kind of work a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Task,
    Bug,
    Feature,
    Improvement,
    Epic,
    Story,
    Subtask,
    Issue,
    Migration,
    Integration,
}

impl ItemKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Improvement => "improvement",
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Subtask => "subtask",
            Self::Issue => "issue",
            Self::Migration => "migration",
            Self::Integration => "integration",
        }
    }
}

/// One entry of an item's ordered checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub order: u32,
}

/// A file attached to a work item. The engine stores metadata only; blob
/// storage is an external concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// All persisted fields of a work item node.
///
/// The struct carries no edges: dependency and hierarchy relations live in
/// the [`crate::graph::store::GraphStore`] indexes, keyed by id. Derived
/// values (overdue, variances, checklist progress) are computed on demand by
/// [`crate::aggregate`] — never cached here.
///
/// Invariants maintained by the engine:
/// - `progress` stays in `[0, 100]`
/// - `completed_at` is set iff `status == Done`
/// - `block_reason` is set only while `status == Blocked`
/// - archived items are immutable until restored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub title: String,
    pub description: Option<String>,
    pub kind: ItemKind,
    pub status: Status,
    pub priority: Priority,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f64,
    pub estimated_hours: Option<f64>,
    pub actual_hours: f64,
    pub estimated_cost: Option<f64>,
    pub actual_cost: f64,
    pub hourly_rate: Option<f64>,
    pub checklist: Vec<ChecklistEntry>,
    pub tags: BTreeSet<String>,
    pub watchers: BTreeSet<String>,
    pub attachments: Vec<Attachment>,
    pub block_reason: Option<String>,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a fresh item in the initial lifecycle status.
    #[must_use]
    pub fn new(id: ItemId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            kind: ItemKind::default(),
            status: Status::Todo,
            priority: Priority::default(),
            start_date: None,
            due_date: None,
            completed_at: None,
            progress: 0.0,
            estimated_hours: None,
            actual_hours: 0.0,
            estimated_cost: None,
            actual_cost: 0.0,
            hourly_rate: None,
            checklist: Vec::new(),
            tags: BTreeSet::new(),
            watchers: BTreeSet::new(),
            attachments: Vec::new(),
            block_reason: None,
            is_archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a checklist entry; order is assigned from the current length.
    /// Returns the new entry.
    pub fn add_checklist_entry(&mut self, title: impl Into<String>) -> ChecklistEntry {
        let order = u32::try_from(self.checklist.len()).unwrap_or(u32::MAX);
        let entry = ChecklistEntry {
            id: Uuid::new_v4().simple().to_string(),
            title: title.into(),
            completed: false,
            order,
        };
        self.checklist.push(entry.clone());
        entry
    }

    /// Toggle a checklist entry's completed flag. Returns `false` if no
    /// entry with that id exists.
    pub fn toggle_checklist_entry(&mut self, entry_id: &str) -> bool {
        match self.checklist.iter_mut().find(|e| e.id == entry_id) {
            Some(entry) => {
                entry.completed = !entry.completed;
                true
            }
            None => false,
        }
    }

    /// Register a watcher. Set semantics: re-adding is a no-op.
    pub fn add_watcher(&mut self, user_id: impl Into<String>) -> bool {
        self.watchers.insert(user_id.into())
    }

    /// Remove a watcher. Returns `false` if the user was not watching.
    pub fn remove_watcher(&mut self, user_id: &str) -> bool {
        self.watchers.remove(user_id)
    }

    /// Membership query against the watcher set.
    #[must_use]
    pub fn is_watching(&self, user_id: &str) -> bool {
        self.watchers.contains(user_id)
    }

    /// Attach file metadata, assigning a fresh attachment id. Returns the
    /// new attachment.
    pub fn add_attachment(
        &mut self,
        name: impl Into<String>,
        url: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Attachment {
        let attachment = Attachment {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            url: url.into(),
            size,
            mime_type: mime_type.into(),
            uploaded_at: now,
        };
        self.attachments.push(attachment.clone());
        attachment
    }

    /// Remove an attachment by id. Returns `false` if absent.
    pub fn remove_attachment(&mut self, attachment_id: &str) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.id != attachment_id);
        self.attachments.len() != before
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {expected}: '{got}'")]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "in_review" => Ok(Self::InReview),
            "testing" => Ok(Self::Testing),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            "blocked" => Ok(Self::Blocked),
            "on_hold" => Ok(Self::OnHold),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "lowest" => Ok(Self::Lowest),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "highest" => Ok(Self::Highest),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for ItemKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "improvement" => Ok(Self::Improvement),
            "epic" => Ok(Self::Epic),
            "story" => Ok(Self::Story),
            "subtask" => Ok(Self::Subtask),
            "issue" => Ok(Self::Issue),
            "migration" => Ok(Self::Migration),
            "integration" => Ok(Self::Integration),
            _ => Err(ParseEnumError {
                expected: "kind",
                got: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ItemKind, Priority, Status, WorkItem};
    use crate::model::item_id::ItemId;
    use chrono::Utc;
    use std::str::FromStr;

    fn item() -> WorkItem {
        WorkItem::new(ItemId::new_unchecked("sn-t1"), "Test item", Utc::now())
    }

    #[test]
    fn enum_json_roundtrips() {
        assert_eq!(serde_json::to_string(&Status::Todo).unwrap(), "\"todo\"");
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&Priority::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(serde_json::to_string(&ItemKind::Epic).unwrap(), "\"epic\"");

        assert_eq!(
            serde_json::from_str::<Status>("\"on_hold\"").unwrap(),
            Status::OnHold
        );
        assert_eq!(
            serde_json::from_str::<Priority>("\"lowest\"").unwrap(),
            Priority::Lowest
        );
        assert_eq!(
            serde_json::from_str::<ItemKind>("\"bug\"").unwrap(),
            ItemKind::Bug
        );
    }

    #[test]
    fn display_parse_roundtrips() {
        for value in [
            Status::Todo,
            Status::InProgress,
            Status::InReview,
            Status::Testing,
            Status::Done,
            Status::Cancelled,
            Status::Blocked,
            Status::OnHold,
            Status::Closed,
        ] {
            assert_eq!(Status::from_str(&value.to_string()).unwrap(), value);
        }

        for value in [
            Priority::Lowest,
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Highest,
            Priority::Critical,
        ] {
            assert_eq!(Priority::from_str(&value.to_string()).unwrap(), value);
        }

        for value in [
            ItemKind::Task,
            ItemKind::Bug,
            ItemKind::Feature,
            ItemKind::Improvement,
            ItemKind::Epic,
            ItemKind::Story,
            ItemKind::Subtask,
            ItemKind::Issue,
            ItemKind::Migration,
            ItemKind::Integration,
        ] {
            assert_eq!(ItemKind::from_str(&value.to_string()).unwrap(), value);
        }
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert!(Status::from_str("active").is_err());
        assert!(Priority::from_str("urgent").is_err());
        assert!(ItemKind::from_str("goal").is_err());
    }

    #[test]
    fn terminal_and_satisfying_statuses() {
        assert!(Status::Done.is_terminal());
        assert!(Status::Cancelled.is_terminal());
        assert!(Status::Closed.is_terminal());
        assert!(!Status::Blocked.is_terminal());

        assert!(Status::Done.satisfies_dependency());
        assert!(Status::Cancelled.satisfies_dependency());
        assert!(!Status::Closed.satisfies_dependency());
        assert!(!Status::Todo.satisfies_dependency());
    }

    #[test]
    fn new_item_starts_in_todo_with_zero_progress() {
        let it = item();
        assert_eq!(it.status, Status::Todo);
        assert!(it.progress.abs() < f64::EPSILON);
        assert!(it.completed_at.is_none());
        assert!(!it.is_archived);
    }

    #[test]
    fn checklist_entries_are_ordered_and_toggleable() {
        let mut it = item();
        let first = it.add_checklist_entry("write tests").id.clone();
        let second = it.add_checklist_entry("ship it").id.clone();

        assert_eq!(it.checklist[0].order, 0);
        assert_eq!(it.checklist[1].order, 1);
        assert_ne!(first, second);

        assert!(it.toggle_checklist_entry(&first));
        assert!(it.checklist[0].completed);
        assert!(it.toggle_checklist_entry(&first));
        assert!(!it.checklist[0].completed);

        assert!(!it.toggle_checklist_entry("missing"));
    }

    #[test]
    fn watcher_set_membership() {
        let mut it = item();
        assert!(it.add_watcher("alice"));
        assert!(!it.add_watcher("alice"), "re-add is a no-op");
        assert!(it.is_watching("alice"));
        assert!(!it.is_watching("bob"));
        assert!(it.remove_watcher("alice"));
        assert!(!it.remove_watcher("alice"));
    }

    #[test]
    fn attachments_add_and_remove() {
        let mut it = item();
        let now = Utc::now();
        let id = it
            .add_attachment("spec.pdf", "blob://spec", 1024, "application/pdf", now)
            .id
            .clone();
        assert_eq!(it.attachments.len(), 1);
        assert!(it.remove_attachment(&id));
        assert!(it.attachments.is_empty());
        assert!(!it.remove_attachment(&id));
    }

    #[test]
    fn work_item_json_roundtrip() {
        let mut it = item();
        it.add_checklist_entry("step");
        it.add_watcher("carol");
        it.tags.insert("backend".to_string());

        let json = serde_json::to_string(&it).unwrap();
        let back: WorkItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, it);
    }
}
