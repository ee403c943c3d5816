//! Cluster connection configuration
//!
//! One entry per database cluster. A cluster hosts many tenant schemas and
//! is addressed by its route, `host:port`.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Database cluster connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster host
    pub host: String,

    /// Cluster port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database holding the tenant schemas
    #[serde(default = "default_database")]
    pub database: String,

    /// Username
    #[serde(default)]
    pub username: String,

    /// Password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// SSL mode
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Maximum pooled connections for this cluster
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Check out one connection during initialization so unreachable
    /// clusters are dropped up front
    #[serde(default = "default_true")]
    pub verify_on_connect: bool,
}

/// SSL connection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Entry of the `DATABASES` environment variable
#[derive(Debug, Deserialize)]
struct ClusterEnvEntry {
    host: Option<String>,
    port: Option<u16>,
}

pub(crate) fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl ClusterConfig {
    /// New cluster entry with defaults for everything but the address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: default_database(),
            username: String::new(),
            password: None,
            ssl_mode: SslMode::default(),
            max_connections: default_max_connections(),
            verify_on_connect: true,
        }
    }

    /// Route identifier used to key the cluster's pool
    pub fn route(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build a PostgreSQL connection string (without password)
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={}",
            self.host, self.port, self.database, self.username
        )
    }

    /// Build the driver configuration, including password, SSL mode and a
    /// server-side statement timeout
    pub fn pg_config(&self, statement_timeout_ms: u64) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .options(&format!("-c statement_timeout={}", statement_timeout_ms))
            .ssl_mode(match self.ssl_mode {
                SslMode::Disable => tokio_postgres::config::SslMode::Disable,
                SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
                SslMode::Require => tokio_postgres::config::SslMode::Require,
            });
        if let Some(ref pw) = self.password {
            pg.password(pw);
        }
        pg
    }

    /// Reject entries that cannot possibly connect
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "cluster {} has an empty host",
                self.route()
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "cluster {} has port 0",
                self.route()
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(format!(
                "cluster {} has max_connections = 0",
                self.route()
            )));
        }
        Ok(())
    }
}

/// Parse the `DATABASES` JSON array (`[{"host": "...", "port": 5432}, ...]`).
///
/// Missing hosts and ports fall back to the given defaults; credentials are
/// shared across all entries.
pub fn parse_databases_env(
    raw: &str,
    default_host: &str,
    default_port: u16,
    username: &str,
    password: Option<&str>,
) -> ConfigResult<Vec<ClusterConfig>> {
    let entries: Vec<ClusterEnvEntry> = serde_json::from_str(raw.trim())?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let mut cluster = ClusterConfig::new(
                entry.host.unwrap_or_else(|| default_host.to_string()),
                entry.port.unwrap_or(default_port),
            );
            cluster.username = username.to_string();
            cluster.password = password.map(str::to_string);
            cluster
        })
        .collect())
}
