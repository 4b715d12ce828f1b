//! Universal data types for the federation engine
//!
//! These types provide a normalized representation of queries and results
//! across relational, analytical, and document backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of a configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Relational,
    Analytical,
    Document,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relational => f.write_str("relational"),
            Self::Analytical => f.write_str("analytical"),
            Self::Document => f.write_str("document"),
        }
    }
}

/// The kind of a query result: one of the backend kinds, or a combined
/// cross-backend join produced by the join engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Relational,
    Analytical,
    Document,
    CrossBackendJoin,
}

impl From<BackendKind> for ResultKind {
    fn from(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Relational => Self::Relational,
            BackendKind::Analytical => Self::Analytical,
            BackendKind::Document => Self::Document,
        }
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A single row of data, keyed by column name.
///
/// Relational and analytical rows share one key set per result; document rows
/// may each carry a different key set and downstream consumers (the join
/// engine in particular) must tolerate that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    pub fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(column.into(), value)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Sort direction for document queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Filter operator for document query predicates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    IsNull,
    IsNotNull,
}

/// A single predicate in a document query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: Value,
}

/// Ordering clause in a document query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// What a document query does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOperation {
    #[default]
    Find,
    Delete,
}

/// The structured filter form accepted by document backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub collection: String,
    #[serde(default)]
    pub operation: DocumentOperation,
    #[serde(default, rename = "where")]
    pub filters: Vec<FieldFilter>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl DocumentQuery {
    pub fn find(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            operation: DocumentOperation::Find,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }
}

/// A logical query: raw SQL for relational/analytical backends, or the
/// structured filter form for document backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    Sql(String),
    Document(DocumentQuery),
}

impl Query {
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql(sql.into())
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Explicit opt-in for destructive operations. Off by default.
    #[serde(default)]
    pub allow_destructive: bool,
    /// Validate the query without materializing results.
    #[serde(default)]
    pub dry_run: bool,
    /// Region/location hint for backends that are location-aware.
    #[serde(default)]
    pub location: Option<String>,
    /// Per-call deadline override, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Per-call cache TTL override, in seconds.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

/// One federated query call. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub backend_id: String,
    pub query: Query,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub options: QueryOptions,
}

impl QueryRequest {
    pub fn sql(backend_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            query: Query::Sql(sql.into()),
            params: Vec::new(),
            options: QueryOptions::default(),
        }
    }

    pub fn document(backend_id: impl Into<String>, query: DocumentQuery) -> Self {
        Self {
            backend_id: backend_id.into(),
            query: Query::Document(query),
            params: Vec::new(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// Query execution result. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub kind: ResultKind,
    pub rows: Vec<Row>,
    pub row_count: usize,
    /// Backend-specific metadata (timings, affected rows, join provenance).
    pub backend_metadata: serde_json::Value,
    pub executed_at: DateTime<Utc>,
}

impl QueryResult {
    pub fn new(kind: ResultKind, rows: Vec<Row>, backend_metadata: serde_json::Value) -> Self {
        let row_count = rows.len();
        Self {
            kind,
            rows,
            row_count,
            backend_metadata,
            executed_at: Utc::now(),
        }
    }

    pub fn empty(kind: ResultKind) -> Self {
        Self::new(kind, Vec::new(), serde_json::Value::Null)
    }
}

/// Column metadata returned by schema introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Normalized table-name → column-descriptors map for one backend.
pub type SchemaMap = BTreeMap<String, Vec<ColumnDescriptor>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_deserializes_from_plain_sql_string() {
        let q: Query = serde_json::from_str(r#""SELECT 1""#).expect("should parse");
        assert_eq!(q, Query::Sql("SELECT 1".to_string()));
    }

    #[test]
    fn query_deserializes_from_structured_filter() {
        let json = r#"{
            "collection": "customers",
            "where": [{"field": "score", "operator": "gte", "value": 80}],
            "order_by": [{"field": "score", "direction": "desc"}],
            "limit": 10
        }"#;
        let q: Query = serde_json::from_str(json).expect("should parse");
        match q {
            Query::Document(dq) => {
                assert_eq!(dq.collection, "customers");
                assert_eq!(dq.operation, DocumentOperation::Find);
                assert_eq!(dq.filters.len(), 1);
                assert_eq!(dq.filters[0].operator, FilterOperator::Gte);
                assert_eq!(dq.limit, Some(10));
            }
            other => panic!("unexpected query variant: {other:?}"),
        }
    }

    #[test]
    fn bytes_round_trip_as_base64() {
        let v = Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&v).expect("serialize");
        assert_eq!(json, r#""3q2+7w==""#);
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        // Untagged enums resolve a base64 string back to Text; equality on the
        // encoded form is what callers rely on.
        assert_eq!(back, Value::Text("3q2+7w==".to_string()));
    }
}
