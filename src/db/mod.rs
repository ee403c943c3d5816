//! Database abstraction layer
//!
//! This module provides a trait-based abstraction over cluster pools,
//! allowing the PostgreSQL backend to be swapped for fakes in tests.

pub mod catalog;
pub mod pool;
pub mod postgres;
pub mod types;

// Re-export main types
pub use catalog::{is_tenant_schema, list_schemas};
pub use pool::{ClusterPool, Connector, PoolManager};
pub use types::{CellValue, DataType, Record};
