//! Chat message formatting
//!
//! Pure functions; the notifier only transports what these produce.

use crate::detect::DetectionResult;
use crate::labels::Labels;
use chrono::{DateTime, FixedOffset};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Summary of one run: per-query totals with per-hospital breakdowns
pub fn format_detection_summary(
    results: &[DetectionResult],
    labels: &Labels,
    cutoff_date: &str,
    detected_at: DateTime<FixedOffset>,
) -> String {
    // query → [(hospital, count)], both in first-seen order
    let mut by_query: Vec<(&str, Vec<(String, usize)>)> = Vec::new();
    let mut total = 0;

    for result in results.iter().filter(|r| !r.is_empty()) {
        let hospital = match labels.hospitals.lookup(&result.schema) {
            Some(name) => name.to_string(),
            None => format!("{} ({})", crate::labels::UNKNOWN_HOSPITAL, result.schema),
        };
        let idx = match by_query.iter().position(|(q, _)| *q == result.query_name) {
            Some(idx) => idx,
            None => {
                by_query.push((result.query_name.as_str(), Vec::new()));
                by_query.len() - 1
            }
        };
        let hospitals = &mut by_query[idx].1;
        match hospitals.iter_mut().find(|(h, _)| *h == hospital) {
            Some((_, count)) => *count += result.count(),
            None => hospitals.push((hospital, result.count())),
        }
        total += result.count();
    }

    if total == 0 {
        return "🎉 *메디씨 데이터 불일치 감지 결과*\n\n✅ 감지된 이상 항목이 없습니다.".to_string();
    }

    let mut message = String::from("🚨 *메디씨 데이터 불일치 감지 결과*\n\n");
    message.push_str(&format!(
        "📊 *{}날짜 이후로 총 {}건의 이상 항목이 감지되었습니다.*\n\n",
        cutoff_date, total
    ));

    for (query, hospitals) in &by_query {
        let query_total: usize = hospitals.iter().map(|(_, n)| n).sum();
        message.push_str(&format!(
            "*[{}] - 총 {}건*\n",
            labels.sheet_name(query),
            query_total
        ));
        for (hospital, count) in hospitals {
            message.push_str(&format!("  • {}: {}건\n", hospital, count));
        }
        message.push('\n');
    }

    message.push_str(&format!("🕒 감지 시간: {}", detected_at.format(TIME_FORMAT)));
    message
}

/// Message sent when a run fails before producing results
pub fn format_error_message(error: &str, at: DateTime<FixedOffset>) -> String {
    format!(
        "❌ *메디씨 데이터 불일치 감지 오류*\n\n🚫 오류 메시지: `{}`\n⏰ {}",
        error,
        at.format(TIME_FORMAT)
    )
}
