//! Analytical connector (DuckDB)
//!
//! Embedded OLAP engine. `url` in the backend config is the database file
//! path; `:memory:` is accepted for in-memory databases.
//!
//! ## Concurrency model
//!
//! The `duckdb` crate is synchronous and the `Connection` is `Send` but
//! `!Sync`, so it lives behind a `std::sync::Mutex` and every call runs as a
//! job on the blocking pool: submit via `spawn_blocking`, wait for the job to
//! run to completion, then hand the fetched rows back.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use duckdb::{params_from_iter, types::Value as DuckValue, Connection};
use tracing::debug;

use crate::engine::classifier::{classify, QueryClass};
use crate::engine::config::BackendConfig;
use crate::engine::error::BackendFailure;
use crate::engine::traits::BackendConnector;
use crate::engine::types::{
    BackendKind, ColumnDescriptor, Query, QueryRequest, QueryResult, ResultKind, Row, SchemaMap,
    Value,
};

/// Analytical backend over an embedded DuckDB database.
pub struct DuckDbConnector {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbConnector {
    /// Opens the database. No pooling: DuckDB is in-process.
    pub fn open(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let path = config.url.trim();

        let conn = if path == ":memory:" || path.is_empty() {
            Connection::open_in_memory()
                .map_err(|e| BackendFailure::Connection(format!("failed to open in-memory database: {e}")))?
        } else {
            Connection::open(path).map_err(|e| {
                BackendFailure::Connection(format!("failed to open database '{path}': {e}"))
            })?
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn value_to_duckdb(value: &Value) -> DuckValue {
        match value {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Float(f) => DuckValue::Double(*f),
            Value::Text(s) => DuckValue::Text(s.clone()),
            Value::Bytes(b) => DuckValue::Blob(b.clone()),
            Value::Json(j) => DuckValue::Text(j.to_string()),
            Value::Array(arr) => DuckValue::Text(serde_json::to_string(arr).unwrap_or_default()),
        }
    }

    /// Extracts a value from a result row, probing types in order of
    /// likelihood.
    fn extract_value(row: &duckdb::Row<'_>, idx: usize) -> Value {
        if let Ok(v) = row.get::<_, Option<i64>>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.get::<_, Option<f64>>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.get::<_, Option<bool>>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.get::<_, Option<String>>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.get::<_, Option<Vec<u8>>>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        Value::Null
    }

    /// Runs one query job to completion on the held connection.
    fn run_job(
        conn: &Connection,
        sql: &str,
        params: &[Value],
        class: QueryClass,
        dry_run: bool,
    ) -> Result<QueryResult, BackendFailure> {
        let start = Instant::now();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| BackendFailure::Syntax(e.to_string()))?;

        if dry_run {
            // The statement compiled; that is the whole job.
            return Ok(QueryResult::new(
                ResultKind::Analytical,
                Vec::new(),
                serde_json::json!({
                    "dry_run": true,
                    "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                }),
            ));
        }

        let duck_params: Vec<DuckValue> = params.iter().map(Self::value_to_duckdb).collect();

        if class == QueryClass::ReadOnly {
            // The duckdb crate panics in column_count/column_name before the
            // statement has executed. query_map executes internally, so values
            // are collected positionally (count read off the row) and column
            // names are taken from the statement only after iteration.
            let rows_iter = stmt
                .query_map(params_from_iter(duck_params.iter()), |row| {
                    let column_count = row.as_ref().column_count();
                    let values: Vec<Value> = (0..column_count)
                        .map(|i| Self::extract_value(row, i))
                        .collect();
                    Ok(values)
                })
                .map_err(|e| BackendFailure::Execution(e.to_string()))?;

            let mut positional = Vec::new();
            for values in rows_iter {
                positional.push(values.map_err(|e| BackendFailure::Execution(e.to_string()))?);
            }

            let names: Vec<String> = (0..stmt.column_count())
                .map(|i| {
                    stmt.column_name(i)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|_| format!("column_{i}"))
                })
                .collect();

            let rows: Vec<Row> = positional
                .into_iter()
                .map(|values| names.iter().cloned().zip(values).collect())
                .collect();
            debug!(rows = rows.len(), "analytical job fetched");

            Ok(QueryResult::new(
                ResultKind::Analytical,
                rows,
                serde_json::json!({
                    "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                }),
            ))
        } else {
            let affected = stmt
                .execute(params_from_iter(duck_params.iter()))
                .map_err(|e| BackendFailure::Execution(e.to_string()))?;

            Ok(QueryResult::new(
                ResultKind::Analytical,
                Vec::new(),
                serde_json::json!({
                    "affected_rows": affected as u64,
                    "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                }),
            ))
        }
    }
}

#[async_trait]
impl BackendConnector for DuckDbConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Analytical
    }

    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, BackendFailure> {
        let sql = match &request.query {
            Query::Sql(sql) => sql.clone(),
            Query::Document(_) => {
                return Err(BackendFailure::Syntax(
                    "analytical backends accept SQL text, not the structured filter form"
                        .to_string(),
                ))
            }
        };

        let class = classify(&request.query);
        let params = request.params.clone();
        let dry_run = request.options.dry_run;
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| BackendFailure::Execution("connection mutex poisoned".to_string()))?;
            Self::run_job(&conn, &sql, &params, class, dry_run)
        })
        .await
        .map_err(|e| BackendFailure::Execution(format!("query job panicked: {e}")))?
    }

    async fn describe(&self) -> Result<SchemaMap, BackendFailure> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| BackendFailure::Execution("connection mutex poisoned".to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT table_name, column_name, data_type, is_nullable \
                     FROM information_schema.columns \
                     WHERE table_schema = 'main' \
                     ORDER BY table_name, ordinal_position",
                )
                .map_err(|e| BackendFailure::Execution(e.to_string()))?;

            let rows_iter = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| BackendFailure::Execution(e.to_string()))?;

            let mut schema = SchemaMap::new();
            for row in rows_iter {
                let (table, column, data_type, is_nullable) =
                    row.map_err(|e| BackendFailure::Execution(e.to_string()))?;
                schema.entry(table).or_default().push(ColumnDescriptor {
                    name: column,
                    data_type,
                    nullable: is_nullable.eq_ignore_ascii_case("yes"),
                });
            }
            Ok(schema)
        })
        .await
        .map_err(|e| BackendFailure::Execution(format!("introspection job panicked: {e}")))?
    }

    async fn shutdown(&self) {
        // In-process engine: dropping the connection releases everything.
    }
}
