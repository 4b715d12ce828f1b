//! Document connector (MongoDB)
//!
//! Interprets the structured filter form natively: predicates become a BSON
//! filter, ordering and limits are pushed to the server, and documents come
//! back as heterogeneous rows with the native `_id` re-emitted as an injected
//! `id` text field.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{options::ClientOptions, Client};
use tracing::debug;

use crate::engine::config::BackendConfig;
use crate::engine::error::BackendFailure;
use crate::engine::traits::BackendConnector;
use crate::engine::types::{
    BackendKind, ColumnDescriptor, DocumentOperation, DocumentQuery, FieldFilter, FilterOperator,
    Query, QueryRequest, QueryResult, ResultKind, Row, SchemaMap, SortDirection, Value,
};

/// How many documents to sample per collection when inferring a schema.
const INTROSPECTION_SAMPLE_SIZE: i64 = 100;

/// Document backend over a MongoDB client.
pub struct MongoConnector {
    client: Client,
    database: String,
}

impl MongoConnector {
    /// Connects and pings the server to validate the configuration.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BackendFailure> {
        let options = ClientOptions::parse(&config.url)
            .await
            .map_err(|e| BackendFailure::Connection(e.to_string()))?;

        let client =
            Client::with_options(options).map_err(|e| BackendFailure::Connection(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("Authentication failed") {
                    BackendFailure::Authentication(msg)
                } else {
                    BackendFailure::Connection(msg)
                }
            })?;

        let database = config
            .database
            .clone()
            .ok_or_else(|| BackendFailure::Connection("document backends require a database name".to_string()))?;

        Ok(Self { client, database })
    }

    fn value_to_bson(value: &Value) -> Bson {
        match value {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(i) => Bson::Int64(*i),
            Value::Float(f) => Bson::Double(*f),
            Value::Text(s) => {
                if let Ok(oid) = mongodb::bson::oid::ObjectId::parse_str(s) {
                    Bson::ObjectId(oid)
                } else {
                    Bson::String(s.clone())
                }
            }
            Value::Bytes(b) => Bson::Binary(mongodb::bson::Binary {
                subtype: mongodb::bson::spec::BinarySubtype::Generic,
                bytes: b.clone(),
            }),
            Value::Json(j) => mongodb::bson::to_bson(j).unwrap_or(Bson::Null),
            Value::Array(arr) => Bson::Array(arr.iter().map(Self::value_to_bson).collect()),
        }
    }

    fn bson_to_value(bson: &Bson) -> Value {
        match bson {
            Bson::Null => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(i) => Value::Int(*i as i64),
            Bson::Int64(i) => Value::Int(*i),
            Bson::Double(f) => Value::Float(*f),
            Bson::String(s) => Value::Text(s.clone()),
            Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
            Bson::DateTime(dt) => dt
                .try_to_rfc3339_string()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            Bson::Array(arr) => Value::Array(arr.iter().map(Self::bson_to_value).collect()),
            Bson::Binary(bin) => Value::Bytes(bin.bytes.clone()),
            other => serde_json::to_value(other)
                .map(Value::Json)
                .unwrap_or(Value::Null),
        }
    }

    fn escape_regex(term: &str) -> String {
        let special_chars = [
            '.', '^', '$', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\',
        ];
        let mut escaped = String::with_capacity(term.len() * 2);
        for c in term.chars() {
            if special_chars.contains(&c) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    /// Translates a SQL-LIKE pattern into an anchored regex.
    fn like_to_regex(pattern: &str) -> String {
        let escaped = Self::escape_regex(pattern);
        format!("^{}$", escaped.replace('%', ".*").replace('_', "."))
    }

    /// Builds the BSON filter document from the structured predicates.
    fn build_filter(filters: &[FieldFilter]) -> Document {
        let mut filter = Document::new();
        for f in filters {
            let value = Self::value_to_bson(&f.value);
            let clause = match f.operator {
                FilterOperator::Eq => value,
                FilterOperator::Neq => Bson::Document(doc! { "$ne": value }),
                FilterOperator::Gt => Bson::Document(doc! { "$gt": value }),
                FilterOperator::Gte => Bson::Document(doc! { "$gte": value }),
                FilterOperator::Lt => Bson::Document(doc! { "$lt": value }),
                FilterOperator::Lte => Bson::Document(doc! { "$lte": value }),
                FilterOperator::Like => {
                    let pattern = match &f.value {
                        Value::Text(s) => Self::like_to_regex(s),
                        other => Self::like_to_regex(&format!("{other:?}")),
                    };
                    Bson::Document(doc! { "$regex": pattern })
                }
                FilterOperator::IsNull => Bson::Null,
                FilterOperator::IsNotNull => Bson::Document(doc! { "$ne": Bson::Null }),
            };
            filter.insert(Self::map_field(&f.field), clause);
        }
        filter
    }

    /// Callers address documents by the injected `id` field; the native name
    /// is `_id`.
    fn map_field(field: &str) -> &str {
        if field == "id" {
            "_id"
        } else {
            field
        }
    }

    fn build_sort(query: &DocumentQuery) -> Document {
        let mut sort = Document::new();
        for clause in &query.order_by {
            let direction = match clause.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            sort.insert(Self::map_field(&clause.field), direction);
        }
        sort
    }

    /// Flattens a document into a normalized row, injecting `id` for `_id`.
    fn document_to_row(doc: &Document) -> Row {
        let mut row = Row::new();
        for (key, value) in doc.iter() {
            if key == "_id" {
                let id = match value {
                    Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
                    other => Self::bson_to_value(other),
                };
                row.insert("id", id);
            } else {
                row.insert(key.clone(), Self::bson_to_value(value));
            }
        }
        row
    }
}

/// Unions field names across sampled documents into column descriptors.
///
/// Schemaless stores have no authoritative schema, so everything reports
/// type `"dynamic"` and nullable — a best-effort sample, not a guarantee.
pub(crate) fn columns_from_samples<'a>(
    documents: impl IntoIterator<Item = &'a Document>,
) -> Vec<ColumnDescriptor> {
    let mut fields: BTreeMap<String, ()> = BTreeMap::new();
    for doc in documents {
        for (key, _) in doc.iter() {
            let name = if key == "_id" { "id" } else { key.as_str() };
            fields.entry(name.to_string()).or_insert(());
        }
    }

    fields
        .into_keys()
        .map(|name| ColumnDescriptor {
            name,
            data_type: "dynamic".to_string(),
            nullable: true,
        })
        .collect()
}

#[async_trait]
impl BackendConnector for MongoConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, BackendFailure> {
        let dq = match &request.query {
            Query::Document(dq) => dq,
            Query::Sql(_) => {
                return Err(BackendFailure::Syntax(
                    "document backends accept the structured filter form, not SQL text".to_string(),
                ))
            }
        };

        let start = Instant::now();
        let collection = self
            .client
            .database(&self.database)
            .collection::<Document>(&dq.collection);
        let filter = Self::build_filter(&dq.filters);

        if request.options.dry_run {
            // Filter construction succeeded; nothing touches the server.
            return Ok(QueryResult::new(
                ResultKind::Document,
                Vec::new(),
                serde_json::json!({ "dry_run": true }),
            ));
        }

        match dq.operation {
            DocumentOperation::Find => {
                let mut find = collection.find(filter);
                if !dq.order_by.is_empty() {
                    find = find.sort(Self::build_sort(dq));
                }
                if let Some(limit) = dq.limit {
                    find = find.limit(limit);
                }

                let mut cursor = find
                    .await
                    .map_err(|e| BackendFailure::Execution(e.to_string()))?;

                let mut rows = Vec::new();
                while let Some(document) = cursor
                    .try_next()
                    .await
                    .map_err(|e| BackendFailure::Execution(e.to_string()))?
                {
                    rows.push(Self::document_to_row(&document));
                }
                debug!(rows = rows.len(), collection = %dq.collection, "document query fetched");

                Ok(QueryResult::new(
                    ResultKind::Document,
                    rows,
                    serde_json::json!({
                        "collection": dq.collection,
                        "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                    }),
                ))
            }
            DocumentOperation::Delete => {
                let outcome = collection
                    .delete_many(filter)
                    .await
                    .map_err(|e| BackendFailure::Execution(e.to_string()))?;

                Ok(QueryResult::new(
                    ResultKind::Document,
                    Vec::new(),
                    serde_json::json!({
                        "collection": dq.collection,
                        "deleted_count": outcome.deleted_count,
                        "execution_time_ms": start.elapsed().as_secs_f64() * 1000.0,
                    }),
                ))
            }
        }
    }

    async fn describe(&self) -> Result<SchemaMap, BackendFailure> {
        let db = self.client.database(&self.database);
        let names = db
            .list_collection_names()
            .await
            .map_err(|e| BackendFailure::Execution(e.to_string()))?;

        let mut schema = SchemaMap::new();
        for name in names {
            let cursor = db
                .collection::<Document>(&name)
                .find(doc! {})
                .limit(INTROSPECTION_SAMPLE_SIZE)
                .await
                .map_err(|e| BackendFailure::Execution(e.to_string()))?;

            let documents: Vec<Document> = cursor
                .try_collect()
                .await
                .map_err(|e| BackendFailure::Execution(e.to_string()))?;

            schema.insert(name, columns_from_samples(&documents));
        }
        Ok(schema)
    }

    async fn shutdown(&self) {
        // The driver's pool is torn down when the client drops.
    }
}
