//! medaudit - A data-quality auditor for multi-tenant clinic databases
//!
//! medaudit connects to one or more PostgreSQL clusters, finds every tenant
//! schema (one per clinic), runs a fixed set of read-only consistency
//! queries against each of them and reports what it found.
//!
//! # Features
//!
//! - **Cluster Pools**: One connection pool per cluster, keyed by `host:port`
//! - **Schema Discovery**: Tenant schemas found fresh on every run
//! - **Detection Queries**: Named, individually switchable anomaly rules
//! - **Fault Isolation**: A failing query or cluster never aborts the run
//! - **Reporting**: Log summary, CSV/JSON export, Slack notification
//! - **Scheduling**: Single run or a cron-like recurring schedule
//!
//! # Architecture
//!
//! - [`config`]: Cluster list and auditor settings
//! - [`db`]: Pool manager, PostgreSQL backend and schema discovery
//! - [`detect`]: Query registry, executor and aggregation
//! - [`report`]: Export and notification sinks
//! - [`auditor`]: Run orchestration
//! - [`schedule`]: Next-run computation
//! - [`labels`]: Hospital and query display names
//! - [`error`]: Error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use medaudit::auditor::Auditor;
//! use medaudit::config::AuditConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuditConfig::load_with_env(None)?;
//! let mut auditor = Auditor::from_config(&config)?;
//! auditor.set_query_enabled("duplicateMeal", false);
//!
//! let report = auditor.run().await?;
//! println!("{} anomalies across {} clusters", report.total(), report.routes.len());
//! # Ok(())
//! # }
//! ```

pub mod auditor;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod labels;
pub mod logging;
pub mod report;
pub mod schedule;
