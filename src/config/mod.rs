//! Configuration management
//!
//! Handles cluster connection entries and auditor settings.

pub mod clusters;
pub mod settings;

pub use clusters::{ClusterConfig, SslMode};
pub use settings::{AuditConfig, ExportSettings, LoggingSettings, ScheduleSettings, SlackSettings};
