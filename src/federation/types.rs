//! Request/response shapes for cross-backend joins.

use serde::{Deserialize, Serialize};

use crate::engine::types::QueryRequest;

/// Supported join types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inner => f.write_str("inner"),
            Self::Left => f.write_str("left"),
        }
    }
}

/// Which column pairs the two row sets are equated on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeys {
    pub left: String,
    pub right: String,
}

/// A cross-backend join: two independent sub-queries and how to combine
/// their row sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left: QueryRequest,
    pub right: QueryRequest,
    #[serde(default)]
    pub join_type: JoinType,
    pub join_keys: JoinKeys,
}
