//! Cluster pool manager
//!
//! Owns one pooled connection resource per configured cluster, keyed by
//! route (`host:port`). Pools are created through a [`Connector`] so the
//! rest of the auditor never sees the concrete database driver:
//! - PostgreSQL via `deadpool-postgres` in production
//! - in-memory fakes in tests

use crate::config::ClusterConfig;
use crate::db::types::Record;
use crate::error::{DbError, DbResult};
use async_trait::async_trait;

/// A pooled, query-executing resource for one cluster
#[async_trait]
pub trait ClusterPool: Send + Sync {
    /// Execute a read-only query with positional text parameters
    ///
    /// # Errors
    /// Returns `DbError::QueryFailed` if the query cannot be executed
    async fn query(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Record>>;

    /// Release every connection held by this pool
    async fn close(&self) -> DbResult<()>;
}

/// Creates pools from cluster configuration
#[async_trait]
pub trait Connector: Send + Sync {
    /// Create (and optionally verify) a pool for one cluster
    ///
    /// # Errors
    /// Returns `DbError::ConnectionInit` if the cluster is unusable
    async fn connect(&self, config: &ClusterConfig) -> DbResult<Box<dyn ClusterPool>>;
}

/// Route-keyed collection of cluster pools
pub struct PoolManager {
    connector: Box<dyn Connector>,
    /// Registration order is preserved; it drives cluster iteration order
    pools: Vec<(String, Box<dyn ClusterPool>)>,
}

impl PoolManager {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            pools: Vec::new(),
        }
    }

    /// Create a pool per cluster config. A failing cluster is logged and
    /// skipped; the remaining configs are still initialized.
    ///
    /// Returns the number of pools registered by this call.
    pub async fn initialize(&mut self, configs: &[ClusterConfig]) -> usize {
        let mut added = 0;
        for config in configs {
            let route = config.route();
            if self.pools.iter().any(|(r, _)| *r == route) {
                tracing::warn!(route = %route, "Duplicate cluster route, keeping the first pool");
                continue;
            }

            let result = match config.validate() {
                Ok(()) => self.connector.connect(config).await,
                Err(e) => Err(DbError::ConnectionInit {
                    route: route.clone(),
                    reason: e.to_string(),
                }),
            };

            match result {
                Ok(pool) => {
                    tracing::info!(route = %route, "Cluster pool ready");
                    self.pools.push((route, pool));
                    added += 1;
                }
                Err(e) => {
                    tracing::error!(route = %route, error = %e, "데이터베이스 연결 실패");
                }
            }
        }
        added
    }

    /// Execute a query against the pool registered under `route`.
    ///
    /// Errors are logged here and returned unchanged; the caller decides
    /// whether to skip or retry.
    pub async fn execute_query(
        &self,
        route: &str,
        sql: &str,
        params: &[&str],
    ) -> DbResult<Vec<Record>> {
        let Some((_, pool)) = self.pools.iter().find(|(r, _)| r == route) else {
            tracing::error!(route = %route, "풀을 찾을 수 없습니다");
            return Err(DbError::UnknownRoute(route.to_string()));
        };

        pool.query(sql, params).await.inspect_err(|e| {
            tracing::error!(route = %route, error = %e, "쿼리 실행 에러");
        })
    }

    /// Registered routes, in registration order
    pub fn list_routes(&self) -> Vec<String> {
        self.pools.iter().map(|(route, _)| route.clone()).collect()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Release every pool. Close failures are logged and do not stop the
    /// remaining pools from closing.
    pub async fn close_all(&mut self) {
        for (route, pool) in self.pools.drain(..) {
            match pool.close().await {
                Ok(()) => tracing::debug!(route = %route, "Cluster pool closed"),
                Err(e) => tracing::error!(route = %route, error = %e, "풀 종료 에러"),
            }
        }
    }
}
