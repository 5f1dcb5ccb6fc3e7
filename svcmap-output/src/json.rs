use svcmap_types::ScanReport;

use crate::traits::{included_rows, OutputError};

/// Render the whole run as one JSON array of target objects.
///
/// `only_success` filtering happens per protocol row; targets keep
/// their object even when every row is filtered, preserving the
/// one-report-per-target property in structured output.
pub fn render_json(reports: &[ScanReport], only_success: bool) -> Result<String, OutputError> {
    let filtered: Vec<ScanReport> = reports
        .iter()
        .map(|report| ScanReport {
            domain: report.domain.clone(),
            ip: report.ip.clone(),
            total_time_ms: report.total_time_ms,
            protocols: included_rows(report, only_success).cloned().collect(),
        })
        .collect();

    serde_json::to_string_pretty(&filtered)
        .map_err(|e| OutputError::FormatError(format!("JSON serialization error: {e}")))
}
