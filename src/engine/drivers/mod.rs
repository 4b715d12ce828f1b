//! Backend connectors, one per backend kind.

pub mod duckdb;
pub mod mongodb;
pub mod postgres;
