//! Postgres-backed record sink.
//!
//! Statements are built dynamically because destination tables are only
//! known at runtime (and may not exist until the loader creates them).

use async_trait::async_trait;
use indexmap::IndexSet;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::table::infer_columns;
use super::{ColumnKind, ColumnSpec, Record, RecordSink, TableSpec};
use crate::error::{SinkError, SinkResult};

/// Postgres error code for "relation does not exist".
const UNDEFINED_TABLE: &str = "42P01";

/// Writes record chunks into Postgres through an `sqlx` pool.
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    async fn ensure_table(&self, spec: &TableSpec, sample: &Record) -> SinkResult<()> {
        let columns = spec
            .columns
            .clone()
            .unwrap_or_else(|| infer_columns(sample));

        let body = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");

        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&spec.name),
            body
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_all(&self, table: &str) -> SinkResult<u64> {
        let statement = format!("DELETE FROM {}", quote_ident(table));
        let result = sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(table, e))?;
        Ok(result.rows_affected())
    }

    async fn delete_by_ids(&self, table: &str, rid: &str, ids: &[Value]) -> SinkResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "DELETE FROM {} WHERE {} IN (",
            quote_ident(table),
            quote_ident(rid)
        ));
        let mut separated = builder.separated(", ");
        for id in ids {
            bind_value(&mut separated, Some(id));
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| classify(table, e))?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, table: &str, records: &[Record]) -> SinkResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        // Column order is first-seen across the chunk; records missing a
        // column get NULL.
        let mut columns: IndexSet<String> = IndexSet::new();
        for record in records {
            for key in record.keys() {
                columns.insert(key.clone());
            }
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) ",
            quote_ident(table),
            column_list
        ));

        builder.push_values(records, |mut row, record| {
            for column in &columns {
                bind_value(&mut row, record.get(column));
            }
        });

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| classify(table, e))?;
        Ok(result.rows_affected())
    }

    async fn reflect(&self, table: &str) -> SinkResult<Option<Vec<ColumnSpec>>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            rows.into_iter()
                .map(|row| {
                    let name: String = row.get("column_name");
                    let data_type: String = row.get("data_type");
                    ColumnSpec::new(name, kind_from_sql(&data_type))
                })
                .collect(),
        ))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Map the undefined-table error code to [`SinkError::MissingTable`];
/// everything else stays a database error.
fn classify(table: &str, err: sqlx::Error) -> SinkError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNDEFINED_TABLE) {
            return SinkError::MissingTable {
                table: table.to_string(),
            };
        }
    }
    SinkError::Database(err)
}

fn bind_value<Sep>(
    row: &mut sqlx::query_builder::Separated<'_, '_, Postgres, Sep>,
    value: Option<&Value>,
) where
    Sep: std::fmt::Display,
{
    match value {
        None | Some(Value::Null) => {
            row.push_bind(None::<String>);
        }
        Some(Value::Bool(b)) => {
            row.push_bind(*b);
        }
        Some(Value::Number(n)) if n.is_i64() => {
            row.push_bind(n.as_i64().unwrap_or_default());
        }
        Some(Value::Number(n)) => {
            row.push_bind(n.as_f64().unwrap_or_default());
        }
        Some(Value::String(s)) => {
            row.push_bind(s.clone());
        }
        Some(other) => {
            row.push_bind(sqlx::types::Json(other.clone()));
        }
    }
}

fn kind_from_sql(data_type: &str) -> ColumnKind {
    match data_type {
        "bigint" | "integer" | "smallint" => ColumnKind::BigInt,
        "double precision" | "real" | "numeric" => ColumnKind::Double,
        "boolean" => ColumnKind::Boolean,
        "json" | "jsonb" => ColumnKind::Jsonb,
        t if t.starts_with("timestamp") => ColumnKind::TimestampTz,
        _ => ColumnKind::Text,
    }
}
