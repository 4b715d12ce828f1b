//! # federata
//!
//! A query federation engine over heterogeneous backends. One logical query
//! surface covers relational (PostgreSQL), analytical (DuckDB), and document
//! (MongoDB) stores; each backend keeps its native execution model behind a
//! normalized request/result shape.
//!
//! The engine classifies every query before it runs and blocks destructive
//! operations unless the caller opts in, caches read-only results with a TTL,
//! and joins row sets from two different backends in memory.
//!
//! ```no_run
//! use federata::engine::config::FederationConfig;
//! use federata::engine::types::QueryRequest;
//! use federata::federation::FederationEngine;
//!
//! # async fn run(config: FederationConfig) -> federata::engine::error::FederationResult<()> {
//! let engine = FederationEngine::bootstrap(&config).await;
//! let result = engine
//!     .execute(&QueryRequest::sql("sales", "SELECT id, name FROM customers"))
//!     .await?;
//! println!("{} rows", result.row_count);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod engine;
pub mod federation;
pub mod observability;

pub use engine::error::{BackendFailure, FederationError, FederationResult};
pub use engine::types::{
    BackendKind, DocumentQuery, Query, QueryOptions, QueryRequest, QueryResult, ResultKind, Row,
    Value,
};
pub use federation::{FederationEngine, JoinKeys, JoinSpec, JoinType};
