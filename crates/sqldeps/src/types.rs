//! Records produced by the external SQL scanner.
//!
//! The scanner is responsible for turning whatever AST shape it works with
//! into these strongly typed records; the index never inspects raw SQL.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::key::{TableKey, normalize_key};

/// What kind of object a definition declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// `CREATE TABLE`
    Table,
    /// `CREATE VIEW`
    View,
    /// `WITH name AS (...)`
    Cte,
}

impl DefinitionKind {
    /// Lowercase name used in snapshots and output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Cte => "cte",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table, view, or CTE declared in a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    /// Name as written in the source
    pub name: String,
    /// Schema qualifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Declared object kind
    pub kind: DefinitionKind,
    /// File that declares it. Overwritten with the updated path when the
    /// record is applied to the index.
    #[serde(default)]
    pub file_path: String,
    /// 1-based line of the declaration
    pub line_number: u32,
}

impl Definition {
    /// Create a definition without a schema qualifier.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: DefinitionKind,
        file_path: impl Into<String>,
        line_number: u32,
    ) -> Self {
        Self {
            name: name.into(),
            schema: None,
            kind,
            file_path: file_path.into(),
            line_number,
        }
    }

    /// Attach a schema qualifier.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Canonical key of the declared object.
    #[must_use]
    pub fn key(&self) -> TableKey {
        normalize_key(&self.name, self.schema.as_deref())
    }

    /// Name in its original casing, schema-qualified when a schema is present.
    #[must_use]
    pub fn display_name(&self) -> String {
        display_name(&self.name, self.schema.as_deref())
    }
}

/// A use of a table or view in a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Referenced name as written in the source
    pub table_name: String,
    /// Schema qualifier, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// File containing the reference. Overwritten with the updated path when
    /// the record is applied to the index.
    #[serde(default)]
    pub file_path: String,
    /// 1-based line of the reference
    pub line_number: u32,
}

impl Reference {
    /// Create a reference without a schema qualifier.
    #[must_use]
    pub fn new(table_name: impl Into<String>, file_path: impl Into<String>, line_number: u32) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
            file_path: file_path.into(),
            line_number,
        }
    }

    /// Attach a schema qualifier.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Canonical key of the referenced object.
    #[must_use]
    pub fn key(&self) -> TableKey {
        normalize_key(&self.table_name, self.schema.as_deref())
    }

    /// Name in its original casing, schema-qualified when a schema is present.
    #[must_use]
    pub fn display_name(&self) -> String {
        display_name(&self.table_name, self.schema.as_deref())
    }
}

fn display_name(name: &str, schema: Option<&str>) -> String {
    match schema.map(str::trim).filter(|s| !s.is_empty()) {
        Some(schema) => format!("{schema}.{name}"),
        None => name.to_string(),
    }
}

/// Output of one successful scan of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Objects declared in the file
    #[serde(default)]
    pub definitions: Vec<Definition>,
    /// Objects used by the file
    #[serde(default)]
    pub references: Vec<Reference>,
}
