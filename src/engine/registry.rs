//! Backend Registry
//!
//! Holds one live connector handle per configured backend, keyed by backend
//! id. Built once at startup from configuration and effectively read-only
//! afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::config::BackendConfig;
use crate::engine::drivers::{duckdb::DuckDbConnector, mongodb::MongoConnector, postgres::PostgresConnector};
use crate::engine::error::{FederationError, FederationResult};
use crate::engine::traits::BackendConnector;
use crate::engine::types::BackendKind;

/// A registered backend: id, kind, and the live connector.
pub struct BackendHandle {
    pub id: String,
    pub kind: BackendKind,
    pub connector: Arc<dyn BackendConnector>,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Registry of all configured backends.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<BackendHandle>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registers a backend. At most one descriptor may exist per id.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        kind: BackendKind,
        connector: Arc<dyn BackendConnector>,
    ) -> FederationResult<Arc<BackendHandle>> {
        let id = id.into();
        if self.backends.contains_key(&id) {
            return Err(FederationError::invalid_config(format!(
                "backend '{id}' is already registered"
            )));
        }
        let handle = Arc::new(BackendHandle {
            id: id.clone(),
            kind,
            connector,
        });
        self.backends.insert(id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Gets a backend handle by id.
    pub fn get(&self, id: &str) -> FederationResult<Arc<BackendHandle>> {
        self.backends
            .get(id)
            .cloned()
            .ok_or_else(|| FederationError::not_configured(id))
    }

    /// Lists all registered backend ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.backends.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Builds connectors for every configured backend.
    ///
    /// A backend whose connector fails to initialize is logged and left
    /// absent — every subsequent `get` for it fails with a configuration
    /// error. No retry happens here.
    pub async fn bootstrap(configs: &[BackendConfig]) -> Self {
        let mut registry = Self::new();

        for config in configs {
            let connector: Result<Arc<dyn BackendConnector>, _> = match config.kind {
                BackendKind::Relational => PostgresConnector::connect(config)
                    .await
                    .map(|c| Arc::new(c) as Arc<dyn BackendConnector>),
                BackendKind::Analytical => {
                    DuckDbConnector::open(config).map(|c| Arc::new(c) as Arc<dyn BackendConnector>)
                }
                BackendKind::Document => MongoConnector::connect(config)
                    .await
                    .map(|c| Arc::new(c) as Arc<dyn BackendConnector>),
            };

            match connector {
                Ok(connector) => match registry.register(&config.id, config.kind, connector) {
                    Ok(_) => info!(backend = %config.id, kind = %config.kind, "registered backend"),
                    Err(e) => warn!(backend = %config.id, error = %e, "skipping duplicate backend"),
                },
                Err(e) => {
                    warn!(backend = %config.id, kind = %config.kind, error = %e,
                        "backend failed to initialize; it will be absent from the registry");
                }
            }
        }

        registry
    }

    /// Drains every backend's pool.
    pub async fn shutdown(&self) {
        for handle in self.backends.values() {
            handle.connector.shutdown().await;
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
