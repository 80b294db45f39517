//! Testing utilities including mock implementations.
//!
//! These are useful for exercising guard and loader logic without the
//! platform, an SMTP relay, or a database. Every mock tracks its calls
//! for later assertions.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::alert::{AlertEmail, Mailer};
use crate::error::{AlertError, SinkError, SinkResult, StatusError};
use crate::loader::{infer_columns, ColumnSpec, Record, RecordSink, TableSpec};
use crate::status::{BoxStatus, StatusApi};

/// Records every status report instead of calling the platform.
#[derive(Default)]
pub struct MockStatusApi {
    reports: Arc<RwLock<Vec<(BoxStatus, String)>>>,
}

impl MockStatusApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(status, message)` reported so far, in order.
    pub fn reports(&self) -> Vec<(BoxStatus, String)> {
        self.reports.read().unwrap().clone()
    }
}

#[async_trait]
impl StatusApi for MockStatusApi {
    async fn report(&self, status: BoxStatus, message: &str) -> Result<(), StatusError> {
        self.reports
            .write()
            .unwrap()
            .push((status, message.to_string()));
        Ok(())
    }
}

/// Captures outgoing alert emails instead of delivering them.
#[derive(Default)]
pub struct MockMailer {
    sent: Arc<RwLock<Vec<AlertEmail>>>,
    fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails, for exercising error propagation.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Every email sent so far, in order.
    pub fn sent(&self) -> Vec<AlertEmail> {
        self.sent.read().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &AlertEmail) -> Result<(), AlertError> {
        if self.fail {
            return Err(AlertError::Address(
                "not an address".parse::<lettre::Address>().unwrap_err(),
            ));
        }
        self.sent.write().unwrap().push(email.clone());
        Ok(())
    }
}

/// Record of a call made to [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    EnsureTable { table: String },
    DeleteAll { table: String },
    DeleteByIds { table: String, ids: usize },
    Insert { table: String, rows: usize },
    Reflect { table: String },
}

#[derive(Default, Clone)]
struct MemoryTable {
    columns: Vec<ColumnSpec>,
    rows: Vec<Record>,
}

/// In-memory [`RecordSink`] with call tracking.
///
/// Operations against a table that was never created return
/// [`SinkError::MissingTable`], the same contract the Postgres sink
/// honors, so lazy-creation paths are exercisable without a database.
#[derive(Default)]
pub struct MemorySink {
    tables: RwLock<IndexMap<String, MemoryTable>>,
    calls: RwLock<Vec<SinkCall>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create an empty table, as if a previous run had made it.
    pub fn with_table(self, name: impl Into<String>) -> Self {
        self.tables
            .write()
            .unwrap()
            .insert(name.into(), MemoryTable::default());
        self
    }

    /// Pre-create an empty table with known column shapes.
    pub fn with_table_columns(self, name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        self.tables.write().unwrap().insert(
            name.into(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    /// Rows currently held by `table`, empty if it does not exist.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Names of every table, in creation order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().unwrap().keys().cloned().collect()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of insert calls made against `table`.
    pub fn insert_calls(&self, table: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, SinkCall::Insert { table: t, .. } if t == table))
            .count()
    }

    fn record(&self, call: SinkCall) {
        self.calls.write().unwrap().push(call);
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn ensure_table(&self, spec: &TableSpec, sample: &Record) -> SinkResult<()> {
        self.record(SinkCall::EnsureTable {
            table: spec.name.clone(),
        });
        self.tables
            .write()
            .unwrap()
            .entry(spec.name.clone())
            .or_insert_with(|| MemoryTable {
                columns: spec.columns.clone().unwrap_or_else(|| infer_columns(sample)),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn delete_all(&self, table: &str) -> SinkResult<u64> {
        self.record(SinkCall::DeleteAll {
            table: table.to_string(),
        });
        let mut tables = self.tables.write().unwrap();
        let entry = tables.get_mut(table).ok_or_else(|| SinkError::MissingTable {
            table: table.to_string(),
        })?;
        let removed = entry.rows.len() as u64;
        entry.rows.clear();
        Ok(removed)
    }

    async fn delete_by_ids(&self, table: &str, rid: &str, ids: &[Value]) -> SinkResult<u64> {
        self.record(SinkCall::DeleteByIds {
            table: table.to_string(),
            ids: ids.len(),
        });
        let mut tables = self.tables.write().unwrap();
        let entry = tables.get_mut(table).ok_or_else(|| SinkError::MissingTable {
            table: table.to_string(),
        })?;
        let before = entry.rows.len();
        entry
            .rows
            .retain(|row| !ids.contains(row.get(rid).unwrap_or(&Value::Null)));
        Ok((before - entry.rows.len()) as u64)
    }

    async fn insert(&self, table: &str, records: &[Record]) -> SinkResult<u64> {
        self.record(SinkCall::Insert {
            table: table.to_string(),
            rows: records.len(),
        });
        let mut tables = self.tables.write().unwrap();
        let entry = tables.get_mut(table).ok_or_else(|| SinkError::MissingTable {
            table: table.to_string(),
        })?;
        entry.rows.extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    async fn reflect(&self, table: &str) -> SinkResult<Option<Vec<ColumnSpec>>> {
        self.record(SinkCall::Reflect {
            table: table.to_string(),
        });
        Ok(self
            .tables
            .read()
            .unwrap()
            .get(table)
            .map(|t| t.columns.clone()))
    }
}
