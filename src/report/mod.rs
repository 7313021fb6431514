//! Report rendering and delivery.

pub mod generator;
pub mod notifier;

pub use generator::{generate_text_report, report_subject};
pub use notifier::ReportNotifier;

use crate::models::AnalysisReport;

/// Best-effort delivery of an analysis report. Failures are logged by the
/// implementation and never returned.
pub trait Notifier {
    async fn deliver(&self, recipient: &str, report: &AnalysisReport);
}
