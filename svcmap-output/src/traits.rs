use svcmap_types::{ProtocolResult, ScanReport};

/// Formats one report at a time so the writer can stream. Formatters
/// may carry per-run state (the `required` format numbers IPs in the
/// order the writer first sees them).
pub trait ReportFormatter: Send {
    /// One-time preamble written before the first report, if any.
    fn header(&self) -> Option<String> {
        None
    }

    fn format(&mut self, report: &ScanReport) -> Result<String, OutputError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("formatting error: {0}")]
    FormatError(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rows to include for a report under the `only_success` filter.
pub(crate) fn included_rows<'a>(
    report: &'a ScanReport,
    only_success: bool,
) -> impl Iterator<Item = &'a ProtocolResult> {
    report
        .protocols
        .iter()
        .filter(move |pr| !only_success || pr.accessible)
}
