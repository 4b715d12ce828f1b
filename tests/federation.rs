//! End-to-end engine behavior over stub backends: the safety gate, the result
//! cache, dispatch deadlines, and cross-backend joins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use federata::engine::config::FederationConfig;
use federata::engine::error::BackendFailure;
use federata::engine::registry::BackendRegistry;
use federata::engine::traits::BackendConnector;
use federata::engine::types::{
    BackendKind, ColumnDescriptor, QueryOptions, QueryRequest, QueryResult, ResultKind, Row,
    SchemaMap, Value,
};
use federata::federation::{FederationEngine, JoinKeys, JoinSpec, JoinType};
use federata::FederationError;

#[derive(Default)]
enum StubBehavior {
    #[default]
    Succeed,
    Fail(BackendFailure),
    Delay(Duration),
    Hang,
}

struct StubConnector {
    kind: BackendKind,
    rows: Vec<Row>,
    behavior: StubBehavior,
    calls: AtomicUsize,
}

impl StubConnector {
    fn new(kind: BackendKind, rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            rows,
            behavior: StubBehavior::Succeed,
            calls: AtomicUsize::new(0),
        })
    }

    fn with_behavior(kind: BackendKind, behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            rows: Vec::new(),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for StubConnector {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            StubBehavior::Succeed => {}
            StubBehavior::Fail(failure) => return Err(failure.clone()),
            StubBehavior::Delay(d) => tokio::time::sleep(*d).await,
            StubBehavior::Hang => std::future::pending::<()>().await,
        }

        if request.options.dry_run {
            return Ok(QueryResult::new(
                self.kind.into(),
                Vec::new(),
                serde_json::json!({ "dry_run": true }),
            ));
        }

        Ok(QueryResult::new(
            self.kind.into(),
            self.rows.clone(),
            serde_json::Value::Null,
        ))
    }

    async fn describe(&self) -> Result<SchemaMap, BackendFailure> {
        let mut schema = SchemaMap::new();
        schema.insert(
            "customers".to_string(),
            vec![ColumnDescriptor {
                name: "id".to_string(),
                data_type: "dynamic".to_string(),
                nullable: true,
            }],
        );
        Ok(schema)
    }

    async fn shutdown(&self) {}
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn engine_with(backends: Vec<(&str, Arc<StubConnector>)>) -> Arc<FederationEngine> {
    let mut registry = BackendRegistry::new();
    for (id, connector) in backends {
        registry
            .register(id, connector.kind(), connector)
            .expect("stub registration");
    }
    Arc::new(FederationEngine::new(registry, &FederationConfig::default()))
}

fn sales_rows() -> Vec<Row> {
    vec![
        row(&[("id", Value::Int(1)), ("name", Value::Text("A".into()))]),
        row(&[("id", Value::Int(2)), ("name", Value::Text("B".into()))]),
    ]
}

fn crm_rows() -> Vec<Row> {
    vec![row(&[
        ("custId", Value::Int(1)),
        ("score", Value::Int(90)),
    ])]
}

#[tokio::test]
async fn unknown_backend_is_a_configuration_error() {
    let engine = engine_with(vec![]);
    let err = engine
        .execute(&QueryRequest::sql("nope", "SELECT 1"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, FederationError::Configuration { .. }));
}

#[tokio::test]
async fn destructive_query_is_blocked_before_the_backend() {
    let stub = StubConnector::new(BackendKind::Relational, vec![]);
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);

    let err = engine
        .execute(&QueryRequest::sql("sales", "DROP TABLE customers"))
        .await
        .expect_err("must be blocked");

    assert!(err.is_safety_violation());
    assert!(err
        .to_string()
        .contains("destructive operation requires explicit opt-in"));
    assert_eq!(stub.calls(), 0, "the backend must never be reached");
}

#[tokio::test]
async fn destructive_query_runs_with_opt_in() {
    let stub = StubConnector::new(BackendKind::Relational, vec![]);
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);

    let request = QueryRequest::sql("sales", "DROP TABLE customers").with_options(QueryOptions {
        allow_destructive: true,
        ..Default::default()
    });
    engine.execute(&request).await.expect("opt-in passes the gate");
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn repeated_reads_hit_the_cache() {
    let stub = StubConnector::new(BackendKind::Relational, sales_rows());
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);
    let request = QueryRequest::sql("sales", "SELECT id, name FROM customers");

    let first = engine.execute(&request).await.expect("first read");
    let second = engine.execute(&request).await.expect("second read");

    assert_eq!(stub.calls(), 1, "second read must be served from cache");
    assert_eq!(first.rows, second.rows);
    assert_eq!(engine.cache_stats().hits, 1);
}

#[tokio::test]
async fn different_params_are_distinct_cache_entries() {
    let stub = StubConnector::new(BackendKind::Relational, sales_rows());
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);

    let base = QueryRequest::sql("sales", "SELECT * FROM customers WHERE id = $1");
    engine
        .execute(&base.clone().with_params(vec![Value::Int(1)]))
        .await
        .expect("read one");
    engine
        .execute(&base.clone().with_params(vec![Value::Int(2)]))
        .await
        .expect("read two");

    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn writes_are_never_cached() {
    let stub = StubConnector::new(BackendKind::Relational, vec![]);
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);
    let request = QueryRequest::sql("sales", "UPDATE customers SET name = 'x' WHERE id = 1");

    engine.execute(&request).await.expect("first write");
    engine.execute(&request).await.expect("second write");

    assert_eq!(stub.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_reads_expire_after_the_ttl() {
    let stub = StubConnector::new(BackendKind::Relational, sales_rows());
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);
    let request = QueryRequest::sql("sales", "SELECT id, name FROM customers");

    engine.execute(&request).await.expect("first read");
    tokio::time::advance(Duration::from_secs(301)).await;
    engine.execute(&request).await.expect("read after expiry");

    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn dry_run_is_never_cached() {
    let stub = StubConnector::new(BackendKind::Relational, sales_rows());
    let engine = engine_with(vec![("sales", Arc::clone(&stub))]);
    let request = QueryRequest::sql("sales", "SELECT id FROM customers").with_options(
        QueryOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    let result = engine.execute(&request).await.expect("dry run");
    assert_eq!(result.row_count, 0);
    assert_eq!(result.backend_metadata["dry_run"], serde_json::json!(true));

    engine.execute(&request).await.expect("second dry run");
    assert_eq!(stub.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_dispatch_times_out() {
    let stub = StubConnector::with_behavior(
        BackendKind::Relational,
        StubBehavior::Delay(Duration::from_secs(5)),
    );
    let engine = engine_with(vec![("sales", stub)]);
    let request = QueryRequest::sql("sales", "SELECT pg_sleep(5)").with_options(QueryOptions {
        timeout_ms: Some(100),
        ..Default::default()
    });

    let err = engine.execute(&request).await.expect_err("must time out");
    match err {
        FederationError::BackendExecution {
            backend_id,
            kind,
            failure,
        } => {
            assert_eq!(backend_id, "sales");
            assert_eq!(kind, BackendKind::Relational);
            assert_eq!(failure, BackendFailure::Timeout { timeout_ms: 100 });
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn left_join_across_backends_keeps_unmatched_rows() {
    let sales = StubConnector::new(BackendKind::Relational, sales_rows());
    let crm = StubConnector::new(BackendKind::Document, crm_rows());
    let engine = engine_with(vec![("sales", sales), ("crm", crm)]);

    let spec = JoinSpec {
        left: QueryRequest::sql("sales", "SELECT id, name FROM customers"),
        right: QueryRequest::document(
            "crm",
            federata::engine::types::DocumentQuery::find("scores"),
        ),
        join_type: JoinType::Left,
        join_keys: JoinKeys {
            left: "id".to_string(),
            right: "custId".to_string(),
        },
    };

    let result = engine.join(&spec).await.expect("join succeeds");

    assert_eq!(result.kind, ResultKind::CrossBackendJoin);
    assert_eq!(result.row_count, 2);

    let matched = &result.rows[0];
    assert_eq!(matched.get("name"), Some(&Value::Text("A".into())));
    assert_eq!(matched.get("score"), Some(&Value::Int(90)));
    assert_eq!(matched.get("custId"), Some(&Value::Int(1)));

    let unmatched = &result.rows[1];
    assert_eq!(unmatched.get("name"), Some(&Value::Text("B".into())));
    assert_eq!(unmatched.get("score"), None);

    assert_eq!(result.backend_metadata["left_backend"], "sales");
    assert_eq!(result.backend_metadata["join_type"], "left");
}

#[tokio::test]
async fn inner_join_drops_unmatched_rows() {
    let sales = StubConnector::new(BackendKind::Relational, sales_rows());
    let crm = StubConnector::new(BackendKind::Document, crm_rows());
    let engine = engine_with(vec![("sales", sales), ("crm", crm)]);

    let spec = JoinSpec {
        left: QueryRequest::sql("sales", "SELECT id, name FROM customers"),
        right: QueryRequest::sql("crm", "SELECT custId, score FROM scores"),
        join_type: JoinType::Inner,
        join_keys: JoinKeys {
            left: "id".to_string(),
            right: "custId".to_string(),
        },
    };

    let result = engine.join(&spec).await.expect("join succeeds");
    assert_eq!(result.row_count, 1);
}

#[tokio::test]
async fn join_keys_of_different_types_never_match() {
    let left = StubConnector::new(
        BackendKind::Relational,
        vec![row(&[("id", Value::Int(1))])],
    );
    let right = StubConnector::new(
        BackendKind::Document,
        vec![row(&[("id", Value::Text("1".into()))])],
    );
    let engine = engine_with(vec![("a", left), ("b", right)]);

    let spec = JoinSpec {
        left: QueryRequest::sql("a", "SELECT id FROM t"),
        right: QueryRequest::sql("b", "SELECT id FROM u"),
        join_type: JoinType::Inner,
        join_keys: JoinKeys {
            left: "id".to_string(),
            right: "id".to_string(),
        },
    };

    let result = engine.join(&spec).await.expect("join succeeds");
    assert_eq!(result.row_count, 0);
}

#[tokio::test(start_paused = true)]
async fn first_sub_query_failure_fails_the_join_fast() {
    let hanging = StubConnector::with_behavior(BackendKind::Relational, StubBehavior::Hang);
    let failing = StubConnector::with_behavior(
        BackendKind::Document,
        StubBehavior::Fail(BackendFailure::Execution("collection unavailable".into())),
    );
    let engine = engine_with(vec![("slow", hanging), ("broken", failing)]);

    let spec = JoinSpec {
        left: QueryRequest::sql("slow", "SELECT id FROM t"),
        right: QueryRequest::document(
            "broken",
            federata::engine::types::DocumentQuery::find("scores"),
        ),
        join_type: JoinType::Inner,
        join_keys: JoinKeys {
            left: "id".to_string(),
            right: "id".to_string(),
        },
    };

    // The left leg never completes; a correct engine returns as soon as the
    // right leg fails, well inside this deadline.
    let outcome = tokio::time::timeout(Duration::from_secs(10), engine.join(&spec)).await;
    let err = outcome
        .expect("join must not wait for the hanging leg")
        .expect_err("join must surface the failure");

    match err {
        FederationError::Join { message, cause } => {
            assert!(message.contains("right sub-query failed"));
            assert!(cause.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn join_sub_queries_go_through_the_safety_gate() {
    let sales = StubConnector::new(BackendKind::Relational, sales_rows());
    let crm = StubConnector::new(BackendKind::Document, crm_rows());
    let engine = engine_with(vec![("sales", Arc::clone(&sales)), ("crm", crm)]);

    let spec = JoinSpec {
        left: QueryRequest::sql("sales", "DROP TABLE customers"),
        right: QueryRequest::sql("crm", "SELECT custId FROM scores"),
        join_type: JoinType::Inner,
        join_keys: JoinKeys {
            left: "id".to_string(),
            right: "custId".to_string(),
        },
    };

    let err = engine.join(&spec).await.expect_err("must be blocked");
    assert!(matches!(err, FederationError::Join { .. }));
    assert!(err.to_string().contains("left sub-query failed"));
    assert_eq!(sales.calls(), 0);
}

#[tokio::test]
async fn describe_resolves_through_the_registry() {
    let stub = StubConnector::new(BackendKind::Document, vec![]);
    let engine = engine_with(vec![("crm", stub)]);

    let schema = engine.describe("crm").await.expect("describe succeeds");
    let columns = schema.get("customers").expect("collection present");
    assert_eq!(columns[0].data_type, "dynamic");
    assert!(columns[0].nullable);

    let err = engine.describe("nope").await.expect_err("unknown backend");
    assert!(matches!(err, FederationError::Configuration { .. }));
}

#[tokio::test]
async fn shutdown_drains_backends_and_stops_the_sweeper() {
    let stub = StubConnector::new(BackendKind::Relational, vec![]);
    let engine = engine_with(vec![("sales", stub)]);

    engine.shutdown().await;
    // Shutdown is idempotent.
    engine.shutdown().await;
}
