//! Anomaly detection
//!
//! The registry holds the rules, the executor runs them per tenant schema,
//! and the summary aggregates what they found.

pub mod executor;
pub mod registry;
pub mod sql;
pub mod summary;

pub use executor::{DetectionResult, Executor};
pub use registry::{DetectionQuery, QueryRegistry};
pub use summary::{Summary, group_by_query, summarize};
