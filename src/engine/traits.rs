//! BackendConnector trait definition
//!
//! This is the core abstraction every backend driver implements. It provides
//! a unified interface for executing normalized queries and introspecting
//! schemas across relational, analytical, and document stores.

use async_trait::async_trait;

use crate::engine::error::BackendFailure;
use crate::engine::types::{BackendKind, QueryRequest, QueryResult, SchemaMap};

/// Core trait implemented once per backend kind.
///
/// Connectors translate the normalized [`QueryRequest`] into the backend's
/// native call and map native rows back into the normalized [`QueryResult`]
/// shape. Native errors are classified into [`BackendFailure`] and propagated
/// unmodified; the engine layer attaches backend id and kind.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// The backend kind this connector serves.
    fn kind(&self) -> BackendKind;

    /// Executes a normalized query request against the backend.
    async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, BackendFailure>;

    /// Queries the backend's native metadata surface and returns a normalized
    /// table → column map. Regenerated on demand, never cached here.
    async fn describe(&self) -> Result<SchemaMap, BackendFailure>;

    /// Releases pooled connections. Called once at shutdown.
    async fn shutdown(&self);
}
