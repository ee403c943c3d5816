//! Common test utilities and helpers
//!
//! In-memory clusters behind the `Connector`/`ClusterPool` seams, and
//! recording sinks.

#![allow(dead_code)]

use async_trait::async_trait;
use medaudit::config::{ClusterConfig, SslMode};
use medaudit::db::catalog::CATALOG_QUERY;
use medaudit::db::{CellValue, ClusterPool, Connector, Record};
use medaudit::detect::{DetectionQuery, DetectionResult, QueryRegistry};
use medaudit::error::{DbError, DbResult, SinkError, SinkResult};
use medaudit::report::{Exporter, Notifier};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Contents of one fake cluster
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    /// Catalog rows, tenant or not
    pub schemas: Vec<String>,
    /// (schema, table) → number of anomalous rows
    pub hits: HashMap<(String, String), usize>,
    /// (schema, table) pairs whose query errors
    pub failing: HashSet<(String, String)>,
    pub discovery_fails: bool,
}

impl FakeCluster {
    pub fn with_schemas(schemas: &[&str]) -> Self {
        Self {
            schemas: schemas.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn hit(mut self, schema: &str, table: &str, rows: usize) -> Self {
        self.hits.insert((schema.to_string(), table.to_string()), rows);
        self
    }

    pub fn fail(mut self, schema: &str, table: &str) -> Self {
        self.failing.insert((schema.to_string(), table.to_string()));
        self
    }

    pub fn broken_catalog(mut self) -> Self {
        self.discovery_fails = true;
        self
    }
}

/// Everything the fake clusters observed
#[derive(Debug, Default)]
pub struct Journal {
    /// (route, sql, params)
    pub queries: Vec<(String, String, Vec<String>)>,
    pub connected: Vec<String>,
    pub closed: Vec<String>,
}

impl Journal {
    /// Detection queries only, catalog listing excluded
    pub fn detection_queries(&self) -> Vec<&(String, String, Vec<String>)> {
        self.queries
            .iter()
            .filter(|(_, sql, _)| sql != CATALOG_QUERY)
            .collect()
    }
}

/// Serves [`FakeCluster`]s keyed by host; unknown hosts refuse to connect
#[derive(Clone, Default)]
pub struct FakeConnector {
    clusters: HashMap<String, FakeCluster>,
    pub journal: Arc<Mutex<Journal>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cluster(mut self, host: &str, cluster: FakeCluster) -> Self {
        self.clusters.insert(host.to_string(), cluster);
        self
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, config: &ClusterConfig) -> DbResult<Box<dyn ClusterPool>> {
        let Some(cluster) = self.clusters.get(&config.host) else {
            return Err(DbError::ConnectionInit {
                route: config.route(),
                reason: "connection refused".to_string(),
            });
        };
        if let Ok(mut journal) = self.journal.lock() {
            journal.connected.push(config.route());
        }
        Ok(Box::new(FakePool {
            route: config.route(),
            cluster: cluster.clone(),
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct FakePool {
    route: String,
    cluster: FakeCluster,
    journal: Arc<Mutex<Journal>>,
}

/// Pull `(schema, table)` out of `... FROM "schema".table ...`
fn target_of(sql: &str) -> Option<(String, String)> {
    let start = sql.find('"')? + 1;
    let len = sql[start..].find('"')?;
    let schema = sql[start..start + len].to_string();
    let rest = sql[start + len + 1..].strip_prefix('.')?;
    let table: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    Some((schema, table))
}

#[async_trait]
impl ClusterPool for FakePool {
    async fn query(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Record>> {
        if let Ok(mut journal) = self.journal.lock() {
            journal.queries.push((
                self.route.clone(),
                sql.to_string(),
                params.iter().map(|p| p.to_string()).collect(),
            ));
        }

        if sql == CATALOG_QUERY {
            if self.cluster.discovery_fails {
                return Err(DbError::QueryFailed("permission denied".to_string()));
            }
            return Ok(self
                .cluster
                .schemas
                .iter()
                .map(|s| Record::new().with("schema_name", CellValue::from(s.as_str())))
                .collect());
        }

        let target = target_of(sql)
            .ok_or_else(|| DbError::QueryFailed(format!("unexpected sql: {}", sql)))?;
        if self.cluster.failing.contains(&target) {
            return Err(DbError::QueryFailed(format!(
                "relation \"{}\".{} does not exist",
                target.0, target.1
            )));
        }
        let count = self.cluster.hits.get(&target).copied().unwrap_or(0);
        Ok((0..count)
            .map(|i| {
                Record::new()
                    .with("PATID", CellValue::Integer(i as i64 + 1))
                    .with("PATNAME", CellValue::from(format!("환자{}", i + 1)))
                    .with("CHARTNO", CellValue::from(format!("{}-{:04}", target.0, i + 1)))
            })
            .collect())
    }

    async fn close(&self) -> DbResult<()> {
        if let Ok(mut journal) = self.journal.lock() {
            journal.closed.push(self.route.clone());
        }
        Ok(())
    }
}

/// A cluster config with no credentials
pub fn cluster(host: &str) -> ClusterConfig {
    ClusterConfig::new(host, 5432)
}

/// Registry whose queries each read the table named after them
pub fn table_registry(names: &[&str]) -> QueryRegistry {
    QueryRegistry::new(
        names
            .iter()
            .map(|name| {
                DetectionQuery::new(
                    *name,
                    format!("rows in {}", name),
                    format!("SELECT * FROM {{schema}}.{} WHERE SCHDATE >= $1", name),
                )
            })
            .collect(),
    )
}

/// What a recording sink was handed
#[derive(Debug, Default)]
pub struct SinkCalls {
    pub exported: Vec<usize>,
    pub notified: Vec<(usize, Vec<PathBuf>)>,
    pub errors: Vec<String>,
    pub checks: usize,
}

/// Exporter that records calls and returns fixed paths, or fails
pub struct RecordingExporter {
    pub calls: Arc<Mutex<SinkCalls>>,
    pub paths: Vec<PathBuf>,
    pub fail: bool,
}

impl Exporter for RecordingExporter {
    fn export(&self, results: &[DetectionResult]) -> SinkResult<Vec<PathBuf>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.exported.push(results.iter().map(|r| r.count()).sum());
        }
        if self.fail {
            return Err(SinkError::Io(std::io::Error::other("disk full")));
        }
        Ok(self.paths.clone())
    }
}

/// Notifier that records calls, or fails
pub struct RecordingNotifier {
    pub calls: Arc<Mutex<SinkCalls>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, results: &[DetectionResult], attachments: &[PathBuf]) -> SinkResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls
                .notified
                .push((results.iter().map(|r| r.count()).sum(), attachments.to_vec()));
        }
        if self.fail {
            return Err(SinkError::Slack("invalid_auth".to_string()));
        }
        Ok(())
    }

    async fn notify_error(&self, message: &str) -> SinkResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.errors.push(message.to_string());
        }
        Ok(())
    }

    async fn check(&self) -> SinkResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.checks += 1;
        }
        if self.fail {
            return Err(SinkError::Slack("invalid_auth".to_string()));
        }
        Ok(())
    }
}

/// In-memory log sink for asserting on emitted events
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Route this thread's events here until the guard drops
    pub fn capture(&self) -> tracing::subscriber::DefaultGuard {
        let buffer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || buffer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Live database settings for the optional PostgreSQL tests
pub fn live_cluster() -> ClusterConfig {
    let mut config = ClusterConfig::new(
        std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        std::env::var("TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5433),
    );
    config.database = std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "test_db".to_string());
    config.username = std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string());
    config.password =
        Some(std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string()));
    config.ssl_mode = SslMode::Disable;
    config
}
