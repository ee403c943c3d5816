//! Audit run orchestration
//!
//! One run: open a pool per cluster, discover tenant schemas, execute the
//! enabled detection queries, summarize, hand the results to the sinks and
//! release every pool. Pools are closed on every exit path.

use crate::config::{AuditConfig, ClusterConfig};
use crate::db::postgres::PostgresConnector;
use crate::db::{Connector, PoolManager, list_schemas};
use crate::detect::{DetectionQuery, DetectionResult, Executor, QueryRegistry, Summary, summarize};
use crate::error::{AuditError, Result};
use crate::labels::Labels;
use crate::report::{Exporter, Notifier, SlackNotifier, SpreadsheetExporter};
use crate::schedule::Schedule;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything a finished run produced
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    /// Clusters that were reachable for this run
    pub routes: Vec<String>,
    /// One result per (cluster, schema, query), schema-major
    pub results: Vec<DetectionResult>,
    pub summary: Summary,
    /// Files written by the exporter, if it ran
    pub exported: Vec<PathBuf>,
}

impl AuditReport {
    pub fn total(&self) -> usize {
        self.summary.grand_total
    }
}

pub struct Auditor {
    pools: PoolManager,
    clusters: Vec<ClusterConfig>,
    registry: QueryRegistry,
    labels: Arc<Labels>,
    cutoff_date: String,
    exporter: Option<Box<dyn Exporter>>,
    notifier: Option<Box<dyn Notifier>>,
}

impl Auditor {
    /// An auditor with the built-in queries and labels and no sinks
    pub fn new(
        connector: Box<dyn Connector>,
        clusters: Vec<ClusterConfig>,
        cutoff_date: impl Into<String>,
    ) -> Self {
        Self {
            pools: PoolManager::new(connector),
            clusters,
            registry: QueryRegistry::builtin(),
            labels: Arc::new(Labels::builtin()),
            cutoff_date: cutoff_date.into(),
            exporter: None,
            notifier: None,
        }
    }

    /// Production auditor: PostgreSQL pools plus the configured sinks
    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        let labels = Arc::new(Labels::with_overrides(&config.hospitals, &config.labels));
        let mut registry = QueryRegistry::builtin();
        registry.apply_overrides(&config.queries);
        let offset = Schedule::from_settings(&config.schedule)?.offset();

        let connector = PostgresConnector::new(Duration::from_millis(config.query_timeout_ms));
        let mut auditor = Self::new(
            Box::new(connector),
            config.clusters.clone(),
            config.cutoff_date.clone(),
        )
        .with_registry(registry)
        .with_labels(Arc::clone(&labels));

        if config.export.enabled {
            auditor = auditor.with_exporter(Box::new(SpreadsheetExporter::new(
                config.export.clone(),
                config.batch_size,
                Arc::clone(&labels),
                offset,
            )));
        }

        match SlackNotifier::from_settings(&config.slack, labels, &config.cutoff_date, offset)? {
            Some(notifier) => auditor = auditor.with_notifier(Box::new(notifier)),
            None => tracing::info!("Slack 알림이 비활성화되어 있습니다."),
        }

        Ok(auditor)
    }

    pub fn with_registry(mut self, registry: QueryRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_labels(mut self, labels: Arc<Labels>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Toggle a query for subsequent runs. Unknown names are ignored.
    pub fn set_query_enabled(&mut self, name: &str, enabled: bool) {
        if self.registry.set_enabled(name, enabled) {
            tracing::info!(query = %name, enabled, "쿼리 활성화 상태 변경");
        }
    }

    /// Every registered query, enabled or not
    pub fn available_queries(&self) -> Vec<DetectionQuery> {
        self.registry.list()
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Verify the notifier's credentials. Without a notifier there is
    /// nothing to check and the result is `true`.
    pub async fn check_notifier(&self) -> bool {
        let Some(notifier) = &self.notifier else {
            return true;
        };
        match notifier.check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Slack 연결 테스트 실패");
                false
            }
        }
    }

    /// Run every enabled query against every reachable cluster.
    ///
    /// # Errors
    /// Returns `AuditError::NoClusters` if no cluster could be initialized.
    /// Query, discovery and sink failures are logged and do not fail the run.
    pub async fn run(&mut self) -> Result<AuditReport> {
        let queries = self.registry.queries().to_vec();
        self.run_queries(&queries).await
    }

    /// Run one query by name, whether or not it is enabled.
    ///
    /// # Errors
    /// Returns `AuditError::UnknownQuery` before touching any cluster if
    /// the name is not registered
    pub async fn run_specific(&mut self, name: &str) -> Result<AuditReport> {
        let mut query = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| AuditError::UnknownQuery(name.to_string()))?;
        query.enabled = true;
        tracing::info!(query = %name, "특정 쿼리 감지 시작");
        self.run_queries(&[query]).await
    }

    async fn run_queries(&mut self, queries: &[DetectionQuery]) -> Result<AuditReport> {
        tracing::info!(cutoff = %self.cutoff_date, "스케줄 감지 시작");
        let outcome = self.detect(queries).await;
        self.pools.close_all().await;

        match outcome {
            Ok((routes, results)) => Ok(self.report(routes, results).await),
            Err(e) => {
                tracing::error!(error = %e, "스케줄 감지 중 에러 발생");
                if let Some(notifier) = &self.notifier
                    && let Err(sink_err) = notifier.notify_error(&e.to_string()).await
                {
                    tracing::error!(error = %sink_err, "Slack 오류 알림 전송 실패");
                }
                Err(e)
            }
        }
    }

    async fn detect(
        &mut self,
        queries: &[DetectionQuery],
    ) -> Result<(Vec<String>, Vec<DetectionResult>)> {
        self.pools.initialize(&self.clusters).await;
        if self.pools.pool_count() == 0 {
            tracing::warn!("사용 가능한 데이터베이스 연결이 없습니다.");
            return Err(AuditError::NoClusters);
        }

        let routes = self.pools.list_routes();
        let executor = Executor::new(&self.pools, &self.labels);
        let mut results = Vec::new();

        for route in &routes {
            match list_schemas(&self.pools, route).await {
                Ok(schemas) => {
                    tracing::info!(route = %route, schemas = schemas.len(), "테넌트 스키마 발견");
                    results.extend(
                        executor
                            .run_all(route, &schemas, queries, &self.cutoff_date)
                            .await,
                    );
                }
                // Other clusters are unaffected
                Err(e) => {
                    tracing::error!(route = %route, error = %e, "데이터베이스 처리 중 에러 발생");
                }
            }
        }

        Ok((routes, results))
    }

    async fn report(&self, routes: Vec<String>, results: Vec<DetectionResult>) -> AuditReport {
        let summary = summarize(&results);
        summary.log(&self.labels);

        let mut exported = Vec::new();
        if summary.grand_total > 0
            && let Some(exporter) = &self.exporter
        {
            match exporter.export(&results) {
                Ok(paths) => exported = paths,
                Err(e) => tracing::error!(error = %e, "결과 파일 생성 실패"),
            }
        }

        if let Some(notifier) = &self.notifier
            && let Err(e) = notifier.notify(&results, &exported).await
        {
            tracing::error!(error = %e, "Slack 알림 전송 실패");
        }

        AuditReport {
            routes,
            results,
            summary,
            exported,
        }
    }
}
