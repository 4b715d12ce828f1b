//! Configuration types for backends and the result cache.
//!
//! The engine is handed these at process start; loading them from a file or
//! the environment is the embedding application's job.

use serde::{Deserialize, Serialize};

use crate::engine::types::BackendKind;

/// Connection parameters for one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique backend identifier used in query requests.
    pub id: String,
    pub kind: BackendKind,
    /// Connection URL (postgres/mongodb) or database path (analytical;
    /// `:memory:` is accepted).
    pub url: String,
    /// Default database/namespace, where the backend kind has one.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub pool_max_connections: Option<u32>,
    #[serde(default)]
    pub pool_acquire_timeout_secs: Option<u32>,
}

/// Result cache tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL for cached read-only results, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval of the background eviction sweep, independent of entry TTLs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Upper bound on resident entries; oldest entries are evicted past it.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_entries() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_entries: default_max_entries(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederationConfig {
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
}
