//! Engine error taxonomy.
//!
//! Every failure the engine can produce is a typed, recoverable outcome
//! routed back to the caller. Structural errors (`Cycle`, `SelfReference`,
//! `ParentConflict`, ...) are detected before any write, so a failed call
//! never leaves partial graph state behind. Each variant maps to a stable
//! machine-readable [`ErrorCode`] for agent-friendly decision making.

use crate::graph::cycles::CyclePath;
use crate::model::item::Status;
use crate::model::item_id::ItemId;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ItemNotFound,
    CycleDetected,
    SelfReference,
    InvalidStateTransition,
    DependencyNotSatisfied,
    ParentConflict,
    ItemArchived,
    InvalidArgument,
    ConfigParseError,
    ProjectionFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ItemNotFound => "E2001",
            Self::InvalidStateTransition => "E2002",
            Self::CycleDetected => "E2003",
            Self::SelfReference => "E2004",
            Self::DependencyNotSatisfied => "E2005",
            Self::ParentConflict => "E2006",
            Self::ItemArchived => "E2007",
            Self::InvalidArgument => "E2008",
            Self::ConfigParseError => "E1002",
            Self::ProjectionFailed => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ItemNotFound => "Work item not found",
            Self::InvalidStateTransition => "Invalid status transition",
            Self::CycleDetected => "Dependency cycle would be created",
            Self::SelfReference => "Item cannot depend on itself",
            Self::DependencyNotSatisfied => "Unresolved dependencies block this transition",
            Self::ParentConflict => "Item already has a different parent",
            Self::ItemArchived => "Item is archived",
            Self::InvalidArgument => "Invalid argument",
            Self::ConfigParseError => "Config file parse error",
            Self::ProjectionFailed => "SQLite projection write failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ItemNotFound => None,
            Self::InvalidStateTransition => {
                Some("Consult the transition table; terminal states only allow reopen.")
            }
            Self::CycleDetected => Some("Remove/adjust dependency links to keep the graph acyclic."),
            Self::SelfReference => Some("Pick a different dependency target."),
            Self::DependencyNotSatisfied => {
                Some("Complete or cancel the blocking items first, then retry.")
            }
            Self::ParentConflict => Some("Detach the item from its current parent first."),
            Self::ItemArchived => Some("Restore the item before mutating it."),
            Self::InvalidArgument => None,
            Self::ConfigParseError => Some("Fix syntax in the engine config TOML and retry."),
            Self::ProjectionFailed => {
                Some("Run a projection rebuild to repair the SQLite database.")
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// All errors the engine surfaces to callers.
///
/// Structural variants carry enough context to report the rejection without
/// another lookup: the cycle path, the rejected transition, the blocking set.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A referenced item id does not exist in the graph.
    #[error("work item not found: '{0}'")]
    NotFound(ItemId),

    /// Adding the edge would close a dependency or hierarchy cycle.
    #[error("{path}")]
    Cycle { path: CyclePath },

    /// An item cannot depend on (or parent) itself.
    #[error("item '{0}' cannot reference itself")]
    SelfReference(ItemId),

    /// The status transition is not in the lifecycle table.
    #[error("illegal transition {from} -> {to} for item '{id}'")]
    IllegalTransition { id: ItemId, from: Status, to: Status },

    /// A guarded transition was attempted while dependencies remain open.
    /// Carries the blocking set so callers can report which prerequisites
    /// remain.
    #[error("item '{id}' has {} unsatisfied dependencies", blocking.len())]
    DependencyNotSatisfied { id: ItemId, blocking: Vec<ItemId> },

    /// Reparenting an item that already has a different parent.
    #[error("item '{child}' already has parent '{current}'; detach before reparenting")]
    ParentConflict {
        child: ItemId,
        current: ItemId,
    },

    /// Archived items are immutable until restored.
    #[error("item '{0}' is archived and cannot be mutated")]
    Archived(ItemId),

    /// A caller-supplied value was out of domain (e.g. negative hours).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The SQLite projection failed. The in-memory graph stays authoritative;
    /// the projection can be repaired with a rebuild.
    #[error("projection error: {0}")]
    Projection(#[from] anyhow::Error),
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ItemNotFound,
            Self::Cycle { .. } => ErrorCode::CycleDetected,
            Self::SelfReference(_) => ErrorCode::SelfReference,
            Self::IllegalTransition { .. } => ErrorCode::InvalidStateTransition,
            Self::DependencyNotSatisfied { .. } => ErrorCode::DependencyNotSatisfied,
            Self::ParentConflict { .. } => ErrorCode::ParentConflict,
            Self::Archived(_) => ErrorCode::ItemArchived,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Projection(_) => ErrorCode::ProjectionFailed,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorCode};
    use crate::model::item::Status;
    use crate::model::item_id::ItemId;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ItemNotFound,
            ErrorCode::CycleDetected,
            ErrorCode::SelfReference,
            ErrorCode::InvalidStateTransition,
            ErrorCode::DependencyNotSatisfied,
            ErrorCode::ParentConflict,
            ErrorCode::ItemArchived,
            ErrorCode::InvalidArgument,
            ErrorCode::ConfigParseError,
            ErrorCode::ProjectionFailed,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::CycleDetected.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn errors_map_to_codes_and_hints() {
        let id = ItemId::new_unchecked("sn-test");
        let err = EngineError::IllegalTransition {
            id: id.clone(),
            from: Status::Done,
            to: Status::Testing,
        };
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert!(err.hint().is_some());
        assert!(err.to_string().contains("done"));
        assert!(err.to_string().contains("testing"));

        let err = EngineError::DependencyNotSatisfied {
            id,
            blocking: vec![ItemId::new_unchecked("sn-dep")],
        };
        assert_eq!(err.code(), ErrorCode::DependencyNotSatisfied);
        assert!(err.to_string().contains('1'));
    }
}
