//! Error types for medaudit
//!
//! This module defines the error hierarchy used throughout the auditor.
//! We use `thiserror` for library-style errors with clear error chains.
//! Failures are contained at the smallest unit that owns them: a query
//! error never leaves the executor, a sink error never leaves reporting.

use std::io;

/// Main error type for an audit run
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reporting sink errors
    #[error("Reporting error: {0}")]
    Sink(#[from] SinkError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// No cluster could be initialized
    #[error("No database connection is available")]
    NoClusters,

    /// Requested detection query is not registered
    #[error("Unknown detection query: {0}")]
    UnknownQuery(String),
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to create or verify a cluster pool
    #[error("Connection to {route} failed: {reason}")]
    ConnectionInit { route: String, reason: String },

    /// No pool is registered under this route
    #[error("No pool registered for route {0}")]
    UnknownRoute(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Catalog listing failed
    #[error("Schema discovery failed on {route}: {reason}")]
    SchemaDiscovery { route: String, reason: String },

    /// Schema name rejected before being spliced into SQL
    #[error("Invalid schema identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Releasing a pool failed
    #[error("Closing pool {route} failed: {reason}")]
    CloseFailed { route: String, reason: String },
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read the config file
    #[error("Failed to read configuration: {0}")]
    Read(#[from] io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to parse the `DATABASES` environment variable
    #[error("Failed to parse DATABASES: {0}")]
    Databases(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reporting sink errors (spreadsheet export, chat notification)
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing an export file failed
    #[error("Export failed: {0}")]
    Io(#[from] io::Error),

    /// Serializing an export failed
    #[error("Serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Chat API refused the request
    #[error("Slack API error: {0}")]
    Slack(String),

    /// Nothing to report
    #[error("No results to export")]
    Empty,
}

/// Specialized Result type for audit runs
pub type Result<T> = std::result::Result<T, AuditError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for reporting sinks
pub type SinkResult<T> = std::result::Result<T, SinkError>;
