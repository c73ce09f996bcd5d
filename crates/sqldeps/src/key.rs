//! Canonical table identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized identity of a table, view, or CTE.
///
/// Every map in the index is keyed by `TableKey`, so two spellings of the
/// same object ("Orders", "orders") always land in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableKey(String);

impl TableKey {
    /// The normalized key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Map an optional schema and a name to the canonical [`TableKey`].
///
/// The result is `schema.name` lowercased when a non-blank schema is given,
/// otherwise just `name` lowercased. An empty `name` is a caller bug.
#[must_use]
pub fn normalize_key(name: &str, schema: Option<&str>) -> TableKey {
    debug_assert!(!name.trim().is_empty(), "table name must not be empty");

    let name = name.trim().to_lowercase();
    match schema.map(str::trim).filter(|s| !s.is_empty()) {
        Some(schema) => TableKey(format!("{}.{name}", schema.to_lowercase())),
        None => TableKey(name),
    }
}
