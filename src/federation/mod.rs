//! Federation engine: the single entry point callers talk to.
//!
//! Every request goes through the same pipeline: resolve the backend,
//! classify and gate the query, consult the result cache for reads, then
//! dispatch to the connector under a deadline. Cross-backend joins fan both
//! sub-queries out in parallel and combine the row sets in memory.

pub mod join;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::cache::{cache_key, CacheStats, ResultCache};
use crate::engine::classifier::{authorize, classify, QueryClass};
use crate::engine::config::FederationConfig;
use crate::engine::error::{BackendFailure, FederationError, FederationResult, JoinSide};
use crate::engine::registry::{BackendHandle, BackendRegistry};
use crate::engine::types::{QueryRequest, QueryResult, ResultKind, SchemaMap};

pub use types::{JoinKeys, JoinSpec, JoinType};

/// Deadline applied to a backend dispatch when the request carries none.
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 30_000;

/// The federation engine. Cheap to share behind an `Arc`.
pub struct FederationEngine {
    registry: Arc<BackendRegistry>,
    cache: Arc<ResultCache>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FederationEngine {
    /// Builds the engine from an already-populated registry.
    ///
    /// Must run inside a tokio runtime: the cache sweeper is spawned here.
    pub fn new(registry: BackendRegistry, config: &FederationConfig) -> Self {
        let cache = Arc::new(ResultCache::new(config.cache.clone()));
        let sweeper = cache.spawn_sweeper();
        Self {
            registry: Arc::new(registry),
            cache,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Connects every configured backend and builds the engine around them.
    pub async fn bootstrap(config: &FederationConfig) -> Self {
        let registry = BackendRegistry::bootstrap(&config.backends).await;
        info!(backends = registry.len(), "federation engine ready");
        Self::new(registry, config)
    }

    /// Executes one query against one backend.
    #[instrument(skip(self, request), fields(backend = %request.backend_id))]
    pub async fn execute(&self, request: &QueryRequest) -> FederationResult<QueryResult> {
        let handle = self.registry.get(&request.backend_id)?;

        let class = classify(&request.query);
        authorize(class, &request.options)?;

        let cacheable = class == QueryClass::ReadOnly && !request.options.dry_run;
        if !cacheable {
            return self.dispatch(&handle, request).await;
        }

        let key = cache_key(request);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let result = self.dispatch(&handle, request).await?;
        self.cache
            .insert(key, result.clone(), request.options.cache_ttl_secs);
        Ok(result)
    }

    /// Dispatches to the connector under the request's deadline.
    async fn dispatch(
        &self,
        handle: &BackendHandle,
        request: &QueryRequest,
    ) -> FederationResult<QueryResult> {
        let timeout_ms = request
            .options
            .timeout_ms
            .unwrap_or(DEFAULT_DISPATCH_TIMEOUT_MS);

        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            handle.connector.execute(request),
        )
        .await
        .unwrap_or(Err(BackendFailure::Timeout { timeout_ms }));

        outcome.map_err(|failure| {
            warn!(backend = %handle.id, kind = %handle.kind, error = %failure, "backend dispatch failed");
            FederationError::backend(&handle.id, handle.kind, failure)
        })
    }

    /// Runs a cross-backend join: both sub-queries in parallel, then an
    /// in-memory hash join over the fetched row sets.
    ///
    /// The first sub-query failure wins: the engine stops waiting for the
    /// other leg and returns. The already-issued backend call is not aborted
    /// mid-flight; its result is simply discarded.
    #[instrument(skip(self, spec), fields(left = %spec.left.backend_id, right = %spec.right.backend_id))]
    pub async fn join(self: &Arc<Self>, spec: &JoinSpec) -> FederationResult<QueryResult> {
        let mut left_task = self.spawn_sub_query(&spec.left);
        let mut right_task = self.spawn_sub_query(&spec.right);

        let mut left_result: Option<QueryResult> = None;
        let mut right_result: Option<QueryResult> = None;

        while left_result.is_none() || right_result.is_none() {
            tokio::select! {
                outcome = &mut left_task, if left_result.is_none() => {
                    left_result = Some(Self::unwrap_sub_query(outcome, JoinSide::Left)?);
                }
                outcome = &mut right_task, if right_result.is_none() => {
                    right_result = Some(Self::unwrap_sub_query(outcome, JoinSide::Right)?);
                }
            }
        }

        // Both are Some once the loop exits.
        let (left, right) = match (left_result, right_result) {
            (Some(l), Some(r)) => (l, r),
            _ => unreachable!("join loop exits only when both legs completed"),
        };

        let rows = join::hash_join(&left.rows, &right.rows, &spec.join_keys, spec.join_type)?;

        Ok(QueryResult::new(
            ResultKind::CrossBackendJoin,
            rows,
            serde_json::json!({
                "left_backend": spec.left.backend_id,
                "right_backend": spec.right.backend_id,
                "join_type": spec.join_type.to_string(),
                "left_rows": left.row_count,
                "right_rows": right.row_count,
            }),
        ))
    }

    fn spawn_sub_query(
        self: &Arc<Self>,
        request: &QueryRequest,
    ) -> JoinHandle<FederationResult<QueryResult>> {
        let engine = Arc::clone(self);
        let request = request.clone();
        tokio::spawn(async move { engine.execute(&request).await })
    }

    fn unwrap_sub_query(
        outcome: Result<FederationResult<QueryResult>, tokio::task::JoinError>,
        side: JoinSide,
    ) -> FederationResult<QueryResult> {
        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(FederationError::join_side(side, e)),
            Err(e) => Err(FederationError::Join {
                message: format!("{side} sub-query task failed: {e}"),
                cause: None,
            }),
        }
    }

    /// Introspects one backend's schema.
    #[instrument(skip(self))]
    pub async fn describe(&self, backend_id: &str) -> FederationResult<SchemaMap> {
        let handle = self.registry.get(backend_id)?;
        handle
            .connector
            .describe()
            .await
            .map_err(|failure| FederationError::backend(backend_id, handle.kind, failure))
    }

    /// Ids of every registered backend, sorted.
    pub fn backends(&self) -> Vec<String> {
        self.registry.list().iter().map(|s| s.to_string()).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Stops the sweeper and drains every backend.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
        self.registry.shutdown().await;
        info!("federation engine shut down");
    }
}

impl Drop for FederationEngine {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }
    }
}
