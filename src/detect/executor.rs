//! Detection executor
//!
//! Runs detection queries against tenant schemas and turns every outcome,
//! success or failure, into a [`DetectionResult`]. A failing query is
//! logged with its context and recorded as an empty result; it never
//! aborts the run.

use crate::db::{PoolManager, Record};
use crate::detect::registry::DetectionQuery;
use crate::detect::sql;
use crate::labels::Labels;

/// Anomalies found by one query in one tenant schema
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub query_name: String,
    pub route: String,
    pub schema: String,
    rows: Vec<Record>,
}

impl DetectionResult {
    pub fn new(
        query_name: impl Into<String>,
        route: impl Into<String>,
        schema: impl Into<String>,
        rows: Vec<Record>,
    ) -> Self {
        Self {
            query_name: query_name.into(),
            route: route.into(),
            schema: schema.into(),
            rows,
        }
    }

    /// A result with no rows, used when the query could not run
    pub fn empty(
        query_name: impl Into<String>,
        route: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self::new(query_name, route, schema, Vec::new())
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Number of anomalous rows; always equal to `rows().len()`
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes detection queries through a [`PoolManager`]
pub struct Executor<'a> {
    pools: &'a PoolManager,
    labels: &'a Labels,
}

impl<'a> Executor<'a> {
    pub fn new(pools: &'a PoolManager, labels: &'a Labels) -> Self {
        Self { pools, labels }
    }

    /// Run one query against one schema. Never fails: errors are logged
    /// and produce an empty result.
    pub async fn run_query(
        &self,
        route: &str,
        schema: &str,
        query: &DetectionQuery,
        cutoff_date: &str,
    ) -> DetectionResult {
        let rendered = match sql::render(&query.template, schema) {
            Ok(sql) => sql,
            Err(e) => {
                tracing::error!(
                    route = %route,
                    schema = %schema,
                    query = %query.name,
                    error = %e,
                    "쿼리 실행 중 에러 발생"
                );
                return DetectionResult::empty(&query.name, route, schema);
            }
        };

        match self.pools.execute_query(route, &rendered, &[cutoff_date]).await {
            Ok(rows) => {
                let result = DetectionResult::new(&query.name, route, schema, rows);
                self.log_rows(&result);
                result
            }
            Err(e) => {
                tracing::error!(
                    route = %route,
                    schema = %schema,
                    query = %query.name,
                    error = %e,
                    "쿼리 실행 중 에러 발생"
                );
                DetectionResult::empty(&query.name, route, schema)
            }
        }
    }

    /// Run every enabled query against every schema, schema-major and in
    /// registry order. Yields exactly one result per (schema, enabled query).
    pub async fn run_all(
        &self,
        route: &str,
        schemas: &[String],
        queries: &[DetectionQuery],
        cutoff_date: &str,
    ) -> Vec<DetectionResult> {
        let enabled: Vec<&DetectionQuery> = queries.iter().filter(|q| q.enabled).collect();
        let mut results = Vec::with_capacity(schemas.len() * enabled.len());

        for schema in schemas {
            tracing::info!(
                route = %route,
                schema = %schema,
                hospital = %self.labels.hospitals.display_name(schema),
                "데이터베이스 처리 중"
            );
            for query in &enabled {
                results.push(self.run_query(route, schema, query, cutoff_date).await);
            }
        }
        results
    }

    /// One audit line per anomalous row, tagged with the tenant
    fn log_rows(&self, result: &DetectionResult) {
        if result.is_empty() {
            return;
        }
        let hospital = self.labels.hospitals.display_name(&result.schema);
        tracing::info!(
            route = %result.route,
            schema = %result.schema,
            count = result.count(),
            "=== {} 결과 ===",
            self.labels.description(&result.query_name)
        );
        for row in result.rows() {
            tracing::info!(
                "DBNAME: {}, HOSNAME: {}, {}",
                result.schema,
                hospital,
                row.to_log_line()
            );
        }
    }
}
