//! Reporting sinks
//!
//! Sinks consume a finished run. A sink failure is logged by the caller and
//! never changes the outcome of the run.

pub mod export;
pub mod message;
pub mod slack;

pub use export::{ExportFormat, SpreadsheetExporter};
pub use slack::SlackNotifier;

use crate::detect::DetectionResult;
use crate::error::SinkResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// Writes results somewhere durable and reports the files it produced
pub trait Exporter: Send + Sync {
    fn export(&self, results: &[DetectionResult]) -> SinkResult<Vec<PathBuf>>;
}

/// Announces a run's outcome
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the run summary, attaching any exported files
    async fn notify(&self, results: &[DetectionResult], attachments: &[PathBuf]) -> SinkResult<()>;

    /// Report a run that failed before producing results
    async fn notify_error(&self, message: &str) -> SinkResult<()>;

    /// Verify credentials without posting anything
    async fn check(&self) -> SinkResult<()>;
}
