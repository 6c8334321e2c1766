//! sinew-core: the work-item dependency & lifecycle engine.
//!
//! Work items live in two independent structures at once: a directed
//! acyclic dependency graph ("A cannot start until B completes") and a
//! parent/child hierarchy for subtasking. This crate owns both, enforces
//! the status state machine over them, and computes the derived numeric
//! facts (progress, variances, overdue) on demand.
//!
//! [`service::WorkItemService`] is the single entry point; everything
//! else is the machinery behind it.
//!
//! # Conventions
//!
//! - **Errors**: every fallible engine call returns
//!   [`error::EngineError`], a closed taxonomy with stable machine codes.
//!   The SQLite projection layer uses `anyhow` internally.
//! - **Logging**: `tracing` macros; the library never installs a
//!   subscriber.
//! - **Time**: `chrono::DateTime<Utc>` everywhere; pure layers take `now`
//!   as a parameter.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod model;
pub mod service;

pub use config::EngineConfig;
pub use error::{EngineError, ErrorCode};
pub use model::item::{Attachment, ChecklistEntry, ItemKind, Priority, Status, WorkItem};
pub use model::item_id::ItemId;
pub use service::{NewWorkItem, WorkItemPatch, WorkItemService};
