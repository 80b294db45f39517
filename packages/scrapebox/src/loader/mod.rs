//! Batch loader: stream extracted records into relational tables in
//! bounded chunks.
//!
//! A load pass takes the output of a record generator (one [`Payload`]
//! per destination), resolves each payload to a table, and writes the
//! records through a pluggable [`RecordSink`]:
//!
//! ```text
//! payloads ─► transforms (normalize → filter → parse)
//!          ─► table resolution (explicit / models / dynamic / reflect)
//!          ─► per table: delete, then chunked inserts
//!          ─► LoadReport
//! ```
//!
//! Delete semantics are asymmetric: a table without a record identifier
//! is fully replaced (one eager delete of everything), while a table with
//! one is never bulk-deleted. Matching ids are removed per chunk just
//! before each insert, so re-running the same input is idempotent.

mod postgres;
mod sink;
mod table;

pub use postgres::PostgresSink;
pub use sink::RecordSink;
pub use table::{infer_columns, sanitize_table_name, ColumnKind, ColumnSpec, TableSpec};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{LoadResult, LoaderError, SinkError};

/// A single extracted row: column name to value.
pub type Record = serde_json::Map<String, Value>;

/// Lazy stream of records; may be unbounded.
pub type RecordIter = Box<dyn Iterator<Item = Record> + Send>;

/// Callable applied to every record in the stream.
pub type RecordFn = Arc<dyn Fn(Record) -> Record + Send + Sync>;

/// Predicate deciding whether a record stays in the stream.
pub type RecordPred = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Maps a grouping-key value to a table name in dynamic mode.
pub type TableNamer = Arc<dyn Fn(&str) -> String + Send + Sync>;

lazy_static! {
    // Process-wide cache of reflected table shapes, filled lazily and
    // never torn down.
    static ref REFLECTED: Mutex<HashMap<String, Vec<ColumnSpec>>> = Mutex::new(HashMap::new());
}

/// One item of a record generator's output.
///
/// A payload carries its records inline, or points at a newline-delimited
/// JSON file to read them from. A payload with neither is a configuration
/// error and fails the whole load immediately.
pub struct Payload {
    /// Destination table name; optional in explicit single-table and
    /// dynamic modes
    pub table: Option<String>,
    /// Inline record stream
    pub records: Option<RecordIter>,
    /// NDJSON file fallback, one record object per line
    pub file: Option<PathBuf>,
}

impl Payload {
    /// Payload with inline records bound for `table`.
    pub fn records<I>(table: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        Self {
            table: Some(table.into()),
            records: Some(Box::new(records.into_iter())),
            file: None,
        }
    }

    /// Payload with inline records and no destination name; the load plan
    /// decides where they go.
    pub fn unnamed<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send + 'static,
    {
        Self {
            table: None,
            records: Some(Box::new(records.into_iter())),
            file: None,
        }
    }

    /// Payload whose records live in an NDJSON file.
    pub fn file(table: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            table: Some(table.into()),
            records: None,
            file: Some(path.into()),
        }
    }
}

/// How destination tables are determined.
pub enum TableMode {
    /// Static descriptors, matched to payloads by table name. A single
    /// descriptor also accepts unnamed payloads.
    Explicit(Vec<TableSpec>),
    /// Resolve payload table names against a models namespace; unknown
    /// names are fatal.
    Models(HashMap<String, TableSpec>),
    /// Group the whole record stream by `key` and create one table per
    /// distinct value. Records missing the key are skipped.
    Dynamic {
        key: String,
        rid: Option<String>,
        namer: Option<TableNamer>,
    },
    /// Reflect existing tables from the database schema, through a
    /// process-wide cache.
    Reflect { rid: Option<String> },
}

/// Everything `populate` needs besides the payloads and the sink.
pub struct LoadPlan {
    mode: TableMode,
    chunk_size: usize,
    row_limit: u64,
    normalize: Option<RecordFn>,
    filter: Option<RecordPred>,
    parse: Option<RecordFn>,
}

impl LoadPlan {
    pub fn new(mode: TableMode) -> Self {
        Self {
            mode,
            chunk_size: 1000,
            row_limit: 0,
            normalize: None,
            filter: None,
            parse: None,
        }
    }

    /// Records per database round trip. Clamped to at least 1.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Stop after this many inserted rows per table; 0 means unlimited.
    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Transform applied to every record before filtering.
    pub fn with_normalize<F>(mut self, f: F) -> Self
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.normalize = Some(Arc::new(f));
        self
    }

    /// Keep only records matching the predicate.
    pub fn with_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(f));
        self
    }

    /// Transform applied to every record after filtering.
    pub fn with_parse<F>(mut self, f: F) -> Self
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(f));
        self
    }
}

/// Per-table outcome of one load pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub deleted: u64,
    pub inserted: u64,
    pub chunks: u64,
}

/// Outcome of one whole load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub tables: Vec<TableReport>,
}

impl LoadReport {
    pub fn total_inserted(&self) -> u64 {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Load every payload's records into the sink according to `plan`.
///
/// Tables load sequentially; a database error (other than the lazily
/// handled missing-table case) aborts the remaining load for that table
/// and propagates.
pub async fn populate(
    payloads: Vec<Payload>,
    sink: &dyn RecordSink,
    plan: &LoadPlan,
) -> LoadResult<LoadReport> {
    let mut report = LoadReport::default();

    match &plan.mode {
        TableMode::Dynamic { key, rid, namer } => {
            // Grouping needs the whole stream, so dynamic mode materializes
            // it up front.
            let mut groups: IndexMap<String, Vec<Record>> = IndexMap::new();
            for (index, payload) in payloads.into_iter().enumerate() {
                for record in materialize(payload, index, plan)? {
                    match record.get(key.as_str()).and_then(key_value) {
                        Some(value) => groups.entry(value).or_default().push(record),
                        None => warn!(key = %key, "record missing grouping key, skipped"),
                    }
                }
            }

            for (value, records) in groups {
                let name = match namer {
                    Some(namer) => namer(&value),
                    None => sanitize_table_name(&value),
                };
                let spec = TableSpec {
                    name,
                    rid: rid.clone(),
                    columns: None,
                };
                report
                    .tables
                    .push(load_table(sink, &spec, Box::new(records.into_iter()), plan).await?);
            }
        }
        _ => {
            for (index, payload) in payloads.into_iter().enumerate() {
                let table = payload.table.clone();
                let records = materialize(payload, index, plan)?;
                let spec = resolve_table(&plan.mode, table.as_deref(), index, sink).await?;
                report.tables.push(load_table(sink, &spec, records, plan).await?);
            }
        }
    }

    Ok(report)
}

/// Turn a payload into a transformed record stream.
fn materialize(payload: Payload, index: usize, plan: &LoadPlan) -> LoadResult<RecordIter> {
    let base: RecordIter = match (payload.records, payload.file) {
        (Some(records), _) => records,
        (None, Some(path)) => Box::new(read_records(&path)?.into_iter()),
        (None, None) => return Err(LoaderError::EmptyPayload { index }),
    };

    let mut stream = base;
    if let Some(normalize) = plan.normalize.clone() {
        stream = Box::new(stream.map(move |r| normalize(r)));
    }
    if let Some(filter) = plan.filter.clone() {
        stream = Box::new(stream.filter(move |r| filter(r)));
    }
    if let Some(parse) = plan.parse.clone() {
        stream = Box::new(stream.map(move |r| parse(r)));
    }
    Ok(stream)
}

/// Read one record per line from an NDJSON file. Blank lines are skipped;
/// anything else that fails to parse is fatal.
fn read_records(path: &Path) -> LoadResult<Vec<Record>> {
    let file = File::open(path).map_err(|source| LoaderError::RecordFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| LoaderError::RecordFile {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| LoaderError::MalformedRecord {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

async fn resolve_table(
    mode: &TableMode,
    table: Option<&str>,
    index: usize,
    sink: &dyn RecordSink,
) -> LoadResult<TableSpec> {
    match mode {
        TableMode::Explicit(specs) => match table {
            Some(name) => specs
                .iter()
                .find(|spec| spec.name == name)
                .cloned()
                .ok_or_else(|| LoaderError::UnknownTable {
                    table: name.to_string(),
                }),
            None if specs.len() == 1 => Ok(specs[0].clone()),
            None => Err(LoaderError::UnnamedPayload { index }),
        },
        TableMode::Models(models) => {
            let name = table.ok_or(LoaderError::UnnamedPayload { index })?;
            models
                .get(name)
                .cloned()
                .ok_or_else(|| LoaderError::UnknownTable {
                    table: name.to_string(),
                })
        }
        TableMode::Reflect { rid } => {
            let name = table.ok_or(LoaderError::UnnamedPayload { index })?;
            Ok(TableSpec {
                name: name.to_string(),
                rid: rid.clone(),
                columns: reflected_columns(sink, name).await?,
            })
        }
        TableMode::Dynamic { .. } => unreachable!("dynamic mode resolves tables by grouping"),
    }
}

/// Reflect a table's columns through the process-wide cache.
async fn reflected_columns(
    sink: &dyn RecordSink,
    table: &str,
) -> LoadResult<Option<Vec<ColumnSpec>>> {
    if let Some(columns) = REFLECTED.lock().unwrap().get(table) {
        return Ok(Some(columns.clone()));
    }

    let columns = sink.reflect(table).await?;
    if let Some(columns) = &columns {
        REFLECTED
            .lock()
            .unwrap()
            .insert(table.to_string(), columns.clone());
    }
    Ok(columns)
}

/// Load one table: delete superseded rows, then insert in bounded chunks.
async fn load_table(
    sink: &dyn RecordSink,
    spec: &TableSpec,
    mut records: RecordIter,
    plan: &LoadPlan,
) -> LoadResult<TableReport> {
    let mut deleted = 0u64;
    let mut inserted = 0u64;
    let mut chunks = 0u64;

    // Full replace when no record identifier is configured: every prior
    // row goes before the first insert. A missing table counts as zero
    // deletions and gets created at the first insert.
    if spec.rid.is_none() {
        deleted += match sink.delete_all(&spec.name).await {
            Ok(n) => n,
            Err(SinkError::MissingTable { .. }) => 0,
            Err(e) => return Err(e.into()),
        };
    }

    loop {
        let take = match chunk_budget(plan, inserted) {
            Some(take) => take,
            None => break, // row limit reached
        };
        let chunk: Vec<Record> = records.by_ref().take(take).collect();
        if chunk.is_empty() {
            break;
        }

        // Replace-by-id: clear rows matching this chunk's identifiers just
        // before inserting them.
        let chunk_deleted = match &spec.rid {
            Some(rid) => {
                let ids: Vec<Value> = chunk.iter().filter_map(|r| r.get(rid.as_str()).cloned()).collect();
                match sink.delete_by_ids(&spec.name, rid, &ids).await {
                    Ok(n) => n,
                    Err(SinkError::MissingTable { .. }) => 0,
                    Err(e) => return Err(e.into()),
                }
            }
            None => 0,
        };
        deleted += chunk_deleted;

        let chunk_inserted = match sink.insert(&spec.name, &chunk).await {
            Ok(n) => n,
            Err(SinkError::MissingTable { .. }) => {
                sink.ensure_table(spec, &chunk[0]).await?;
                sink.insert(&spec.name, &chunk).await?
            }
            Err(e) => return Err(e.into()),
        };
        inserted += chunk_inserted;
        chunks += 1;

        debug!(
            table = %spec.name,
            deleted = chunk_deleted,
            inserted = chunk_inserted,
            "loaded chunk"
        );
    }

    info!(
        table = %spec.name,
        inserted,
        deleted,
        chunks,
        "table load complete"
    );

    Ok(TableReport {
        table: spec.name.clone(),
        deleted,
        inserted,
        chunks,
    })
}

/// Records the next chunk may hold, honoring the per-table row limit.
/// `None` once the limit is exhausted; a limit of 0 never limits.
fn chunk_budget(plan: &LoadPlan, inserted: u64) -> Option<usize> {
    if plan.row_limit == 0 {
        return Some(plan.chunk_size);
    }
    match plan.row_limit.saturating_sub(inserted) {
        0 => None,
        remaining => Some(plan.chunk_size.min(remaining as usize)),
    }
}

/// Grouping-key value as a table-name-able string. Non-scalar values
/// cannot name a table.
fn key_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
