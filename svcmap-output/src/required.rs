use std::collections::HashMap;
use std::fmt::Write;

use svcmap_types::ScanReport;

use crate::traits::{included_rows, OutputError, ReportFormatter};

/// `<seq>,<ip>,<port>,<banner>` per included row. Each unique IP gets
/// an increasing 1-based sequence number in the order the writer first
/// emits it, stable for the whole run.
pub struct RequiredFormatter {
    only_success: bool,
    sequence: HashMap<String, usize>,
    next_seq: usize,
}

impl RequiredFormatter {
    pub fn new(only_success: bool) -> Self {
        Self {
            only_success,
            sequence: HashMap::new(),
            next_seq: 0,
        }
    }

    fn seq_for(&mut self, ip: &str) -> usize {
        if let Some(&seq) = self.sequence.get(ip) {
            return seq;
        }
        self.next_seq += 1;
        self.sequence.insert(ip.to_string(), self.next_seq);
        self.next_seq
    }
}

impl ReportFormatter for RequiredFormatter {
    fn format(&mut self, report: &ScanReport) -> Result<String, OutputError> {
        let mut out = String::new();
        for pr in included_rows(report, self.only_success) {
            let seq = self.seq_for(&report.ip);
            writeln!(out, "{},{},{},{}", seq, report.ip, pr.port, pr.attributes.banner)
                .map_err(|e| OutputError::FormatError(e.to_string()))?;
        }
        Ok(out)
    }
}
