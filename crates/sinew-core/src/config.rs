//! Engine configuration.
//!
//! Callers embed the engine, so configuration is plain data: construct an
//! [`EngineConfig`] directly or load one from a TOML file. Every field has
//! a default matching the documented engine behavior, and unknown keys are
//! ignored so configs stay forward-compatible.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub delete: DeleteConfig,
}

/// Dependency gating on status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Require every direct dependency to be satisfied before an item may
    /// enter `InProgress` or `Done`.
    #[serde(default = "default_true")]
    pub enforce_dependencies: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enforce_dependencies: default_true(),
        }
    }
}

/// Behavior of progress updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// A partial progress value on a `Todo` item advances it to
    /// `InProgress`.
    #[serde(default = "default_true")]
    pub auto_advance: bool,
    /// A progress value of 100 completes the item (with all `Done` side
    /// effects).
    #[serde(default = "default_true")]
    pub auto_complete: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            auto_advance: default_true(),
            auto_complete: default_true(),
        }
    }
}

/// Behavior of item deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteConfig {
    /// Delete the whole hierarchy subtree instead of reparenting children
    /// to root when the caller does not say either way.
    #[serde(default)]
    pub cascade_children: bool,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            cascade_children: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Load an [`EngineConfig`] from a TOML file. A missing file yields the
/// defaults; a present-but-invalid file is an error.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read engine config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parse engine config {}", path.display()))
}
