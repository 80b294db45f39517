//! Table descriptors and column shapes for the batch loader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Record;

/// Destination table descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    /// Record-identifier column used for replace-by-id. `None` means every
    /// load fully replaces the table.
    pub rid: Option<String>,
    /// Explicit column shapes used if the table has to be created.
    /// Inferred from the first available record otherwise.
    pub columns: Option<Vec<ColumnSpec>>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rid: None,
            columns: None,
        }
    }

    pub fn with_rid(mut self, rid: impl Into<String>) -> Self {
        self.rid = Some(rid.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = Some(columns);
        self
    }
}

/// One column of a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    BigInt,
    Double,
    Boolean,
    TimestampTz,
    Jsonb,
}

impl ColumnKind {
    /// Postgres type name used when creating tables.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::BigInt => "BIGINT",
            ColumnKind::Double => "DOUBLE PRECISION",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::TimestampTz => "TIMESTAMPTZ",
            ColumnKind::Jsonb => "JSONB",
        }
    }

    /// Best-fit column kind for a JSON value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnKind::BigInt,
            Value::Number(_) => ColumnKind::Double,
            Value::String(_) | Value::Null => ColumnKind::Text,
            Value::Array(_) | Value::Object(_) => ColumnKind::Jsonb,
        }
    }
}

/// Infer a full column list from a sample record.
pub fn infer_columns(sample: &Record) -> Vec<ColumnSpec> {
    sample
        .iter()
        .map(|(name, value)| ColumnSpec::new(name, ColumnKind::infer(value)))
        .collect()
}

/// Reduce an arbitrary grouping-key value to a usable table name.
///
/// Lowercases, collapses runs of non-alphanumerics to single underscores,
/// and prefixes names that would start with a digit.
pub fn sanitize_table_name(value: &str) -> String {
    let mut name = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_end_matches('_');

    if name.is_empty() {
        "unnamed".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{name}")
    } else {
        name.to_string()
    }
}
