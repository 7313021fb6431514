//! Plain-text report generation.
//!
//! This module renders an analysis result into the body used for both the
//! delivered message and the saved report file.

use crate::models::AnalysisReport;
use chrono::{DateTime, Local};

/// Subject line for a report generated at `now`.
pub fn report_subject(now: DateTime<Local>) -> String {
    format!("X Feed Analysis Report - {}", now.format("%Y-%m-%d %H:%M"))
}

/// Generate the full report body.
pub fn generate_text_report(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str("X Feed Analysis Report\n\n");

    match report.time_range {
        Some(range) => output.push_str(&format!("Time Range: {}\n", range)),
        None => output.push_str("Time Range: unknown\n"),
    }
    output.push_str(&format!("Users Analyzed: {}\n", report.user_count));
    output.push_str(&format!("Total Posts: {}\n", report.total_posts));
    output.push_str(&format!(
        "Generated: {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("Analysis Results:\n");
    output.push_str("----------------\n");
    output.push_str(&report.analysis_text);
    output.push_str("\n\n");

    output.push_str(&generate_footer(&report.model));

    output
}

fn generate_footer(model: &str) -> String {
    format!("---\nGenerated by FeedDigest using `{}`\n", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRange;
    use chrono::{TimeZone, Utc};

    fn create_test_report() -> AnalysisReport {
        AnalysisReport {
            analysis_text: "1. Topics: Rust".to_string(),
            user_count: 2,
            total_posts: 6,
            time_range: Some(TimeRange {
                oldest: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
                newest: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
            }),
            model: "test-model".to_string(),
            generated_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_generate_text_report() {
        let text = generate_text_report(&create_test_report());

        assert!(text.starts_with("X Feed Analysis Report"));
        assert!(text.contains("Time Range: From 2025-03-01T08:00:00+00:00 to 2025-03-01T09:30:00+00:00"));
        assert!(text.contains("Users Analyzed: 2"));
        assert!(text.contains("Total Posts: 6"));
        assert!(text.contains("1. Topics: Rust"));
        assert!(text.contains("`test-model`"));
    }

    #[test]
    fn test_missing_time_range() {
        let mut report = create_test_report();
        report.time_range = None;
        assert!(generate_text_report(&report).contains("Time Range: unknown"));
    }

    #[test]
    fn test_subject() {
        let now = Local.with_ymd_and_hms(2025, 3, 1, 10, 5, 0).unwrap();
        assert_eq!(report_subject(now), "X Feed Analysis Report - 2025-03-01 10:05");
    }
}
