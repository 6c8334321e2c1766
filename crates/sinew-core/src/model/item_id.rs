//! Opaque, validated work-item identifiers.
//!
//! Ids render as `sn-` followed by a lowercase hex tail derived from a
//! UUIDv4. The newtype keeps the rest of the engine honest: edge indexes,
//! blocking sets, and projection rows are all keyed by [`ItemId`], never by
//! raw strings or live object references.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix shared by every work-item id.
pub const ID_PREFIX: &str = "sn-";

/// An opaque work-item identifier (`sn-` + lowercase hex tail).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

/// Error returned when parsing a malformed id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid item id: '{got}' (expected '{ID_PREFIX}' + lowercase hex tail)")]
pub struct ParseIdError {
    pub got: String,
}

impl ItemId {
    /// Generate a fresh id from a random UUIDv4.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Validate and wrap an id string.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] if the prefix is missing, the tail is empty,
    /// or the tail contains characters outside `[0-9a-z]`.
    pub fn new(raw: &str) -> Result<Self, ParseIdError> {
        let tail = raw.strip_prefix(ID_PREFIX).ok_or_else(|| ParseIdError {
            got: raw.to_string(),
        })?;
        if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(ParseIdError {
                got: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Wrap an id without validation. For test fixtures and trusted
    /// projection rows only.
    #[must_use]
    pub fn new_unchecked(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}
