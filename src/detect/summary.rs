//! Result aggregation

use crate::detect::executor::DetectionResult;
use crate::labels::Labels;

/// Totals over a set of detection results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Per-query totals, in first-seen order
    pub per_query: Vec<(String, usize)>,
    /// Per-schema totals, in first-seen order
    pub per_schema: Vec<(String, usize)>,
    pub grand_total: usize,
}

impl Summary {
    pub fn query_total(&self, query: &str) -> Option<usize> {
        self.per_query
            .iter()
            .find(|(name, _)| name == query)
            .map(|(_, total)| *total)
    }

    pub fn schema_total(&self, schema: &str) -> Option<usize> {
        self.per_schema
            .iter()
            .find(|(name, _)| name == schema)
            .map(|(_, total)| *total)
    }

    /// Log the run summary with localized query descriptions
    pub fn log(&self, labels: &Labels) {
        tracing::info!("=== 감지 결과 요약 ===");
        for (query, total) in &self.per_query {
            tracing::info!("{}: {}건", labels.description(query), total);
        }
        tracing::info!("총 {}건 감지되었습니다.", self.grand_total);
    }
}

fn add_to(totals: &mut Vec<(String, usize)>, key: &str, count: usize) {
    match totals.iter_mut().find(|(k, _)| k == key) {
        Some((_, total)) => *total += count,
        None => totals.push((key.to_string(), count)),
    }
}

/// Sum counts per query and per schema. Queries with zero hits still get
/// an entry.
pub fn summarize(results: &[DetectionResult]) -> Summary {
    let mut summary = Summary::default();
    for result in results {
        add_to(&mut summary.per_query, &result.query_name, result.count());
        add_to(&mut summary.per_schema, &result.schema, result.count());
        summary.grand_total += result.count();
    }
    summary
}

/// Group results by query name, in first-seen order
pub fn group_by_query(results: &[DetectionResult]) -> Vec<(&str, Vec<&DetectionResult>)> {
    let mut groups: Vec<(&str, Vec<&DetectionResult>)> = Vec::new();
    for result in results {
        match groups.iter_mut().find(|(name, _)| *name == result.query_name) {
            Some((_, members)) => members.push(result),
            None => groups.push((result.query_name.as_str(), vec![result])),
        }
    }
    groups
}
