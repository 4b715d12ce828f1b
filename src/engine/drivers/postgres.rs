//! Relational connector (PostgreSQL)
//!
//! Executes parameterized statements over a pooled SQLx connection and maps
//! native row/column metadata into the normalized result shape.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::{Column, Executor, Row as SqlxRow};
use tracing::debug;

use crate::engine::classifier::{classify, QueryClass};
use crate::engine::config::BackendConfig;
use crate::engine::error::BackendFailure;
use crate::engine::traits::BackendConnector;
use crate::engine::types::{
    BackendKind, Query, QueryRequest, QueryResult, ResultKind, Row, SchemaMap, ColumnDescriptor,
    Value,
};

/// Relational backend over a PostgreSQL pool.
pub struct PostgresConnector {
    pool: PgPool,
}

impl PostgresConnector {
    /// Opens the connection pool. Pool sizing comes from the backend config.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let max_connections = config.pool_max_connections.unwrap_or(5);
        let acquire_timeout = config.pool_acquire_timeout_secs.unwrap_or(30);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout as u64))
            .connect(&config.url)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("password authentication failed") {
                    BackendFailure::Authentication(msg)
                } else {
                    BackendFailure::Connection(msg)
                }
            })?;

        Ok(Self { pool })
    }

    /// Helper to bind a normalized value to a Postgres query.
    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        value: &'q Value,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Bytes(b) => query.bind(b),
            Value::Json(j) => query.bind(j),
            // Arrays have no single Postgres type; bind as NULL
            Value::Array(_) => query.bind(Option::<String>::None),
        }
    }

    /// Converts an SQLx row to the normalized name → value map.
    fn convert_row(pg_row: &PgRow) -> Row {
        pg_row
            .columns()
            .iter()
            .map(|col| {
                (
                    col.name().to_string(),
                    Self::extract_value(pg_row, col.ordinal()),
                )
            })
            .collect()
    }

    /// Extracts a value from a PgRow at the given index.
    ///
    /// Types are probed in order of likelihood; `Option<T>` handles NULLs.
    fn extract_value(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.to_rfc3339()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
            return v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn map_error(e: sqlx::Error) -> BackendFailure {
        match &e {
            sqlx::Error::Database(db) => {
                // Class 42: syntax error or access rule violation
                if db.code().map(|c| c.starts_with("42")).unwrap_or(false) {
                    BackendFailure::Syntax(db.message().to_string())
                } else {
                    BackendFailure::Execution(db.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut => BackendFailure::Connection(e.to_string()),
            _ => BackendFailure::Execution(e.to_string()),
        }
    }
}

#[async_trait]
impl BackendConnector for PostgresConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, BackendFailure> {
        let sql = match &request.query {
            Query::Sql(sql) => sql,
            Query::Document(_) => {
                return Err(BackendFailure::Syntax(
                    "relational backends accept SQL text, not the structured filter form"
                        .to_string(),
                ))
            }
        };

        let start = Instant::now();

        if request.options.dry_run {
            // Prepare-only round trip validates the statement without
            // materializing anything.
            self.pool.prepare(sql).await.map_err(Self::map_error)?;
            return Ok(QueryResult::new(
                ResultKind::Relational,
                Vec::new(),
                serde_json::json!({
                    "dry_run": true,
                    "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                }),
            ));
        }

        let mut query = sqlx::query(sql);
        for param in &request.params {
            query = Self::bind_param(query, param);
        }

        if classify(&request.query) == QueryClass::ReadOnly {
            let pg_rows = query.fetch_all(&self.pool).await.map_err(Self::map_error)?;
            let rows: Vec<Row> = pg_rows.iter().map(Self::convert_row).collect();
            debug!(rows = rows.len(), "relational query fetched");

            Ok(QueryResult::new(
                ResultKind::Relational,
                rows,
                serde_json::json!({
                    "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                }),
            ))
        } else {
            let outcome = query.execute(&self.pool).await.map_err(Self::map_error)?;

            Ok(QueryResult::new(
                ResultKind::Relational,
                Vec::new(),
                serde_json::json!({
                    "affected_rows": outcome.rows_affected(),
                    "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                }),
            ))
        }
    }

    async fn describe(&self) -> Result<SchemaMap, BackendFailure> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT table_name, column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_error)?;

        let mut schema = SchemaMap::new();
        for (table, column, data_type, is_nullable) in rows {
            schema.entry(table).or_default().push(ColumnDescriptor {
                name: column,
                data_type,
                nullable: is_nullable == "YES",
            });
        }
        Ok(schema)
    }

    async fn shutdown(&self) {
        self.pool.close().await;
    }
}
