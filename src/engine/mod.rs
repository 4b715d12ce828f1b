//! Core engine: types, configuration, classification, and backend connectors.

pub mod classifier;
pub mod config;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use classifier::{authorize, classify, QueryClass};
pub use config::{BackendConfig, CacheConfig, FederationConfig};
pub use error::{BackendFailure, FederationError, FederationResult, JoinSide};
pub use registry::{BackendHandle, BackendRegistry};
pub use traits::BackendConnector;
pub use types::{
    BackendKind, ColumnDescriptor, DocumentOperation, DocumentQuery, FieldFilter, FilterOperator,
    OrderBy, Query, QueryOptions, QueryRequest, QueryResult, ResultKind, Row, SchemaMap,
    SortDirection, Value,
};
