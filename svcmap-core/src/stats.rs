use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use svcmap_types::{Protocol, ScanReport};

/// Run counters shared by the ingester, the writer, and the CLI
/// summary. When resuming, counters are preloaded from the checkpoint
/// so the totals stay monotonic across interruptions.
pub struct ScanStats {
    total_targets: AtomicU64,
    successful_ips: AtomicU64,
    reports_written: AtomicU64,
    protocol_counts: Mutex<BTreeMap<Protocol, u64>>,
    started: Instant,
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanStats {
    pub fn new() -> Self {
        Self {
            total_targets: AtomicU64::new(0),
            successful_ips: AtomicU64::new(0),
            reports_written: AtomicU64::new(0),
            protocol_counts: Mutex::new(BTreeMap::new()),
            started: Instant::now(),
        }
    }

    /// Seed counters from a loaded checkpoint.
    pub fn preload(&self, processed: u64, successful: u64) {
        self.total_targets.store(processed, Ordering::Relaxed);
        self.reports_written.store(processed, Ordering::Relaxed);
        self.successful_ips.store(successful, Ordering::Relaxed);
    }

    pub fn target_admitted(&self) {
        self.total_targets.fetch_add(1, Ordering::Relaxed);
    }

    /// Account one written report; returns whether any row succeeded.
    pub fn record_report(&self, report: &ScanReport) -> bool {
        self.reports_written.fetch_add(1, Ordering::Relaxed);
        let mut any_success = false;
        {
            let mut counts = self.protocol_counts.lock().expect("stats poisoned");
            for pr in &report.protocols {
                if pr.accessible {
                    any_success = true;
                    *counts.entry(pr.protocol).or_insert(0) += 1;
                }
            }
        }
        if any_success {
            self.successful_ips.fetch_add(1, Ordering::Relaxed);
        }
        any_success
    }

    pub fn reports_written(&self) -> u64 {
        self.reports_written.load(Ordering::Relaxed)
    }

    pub fn successful_ips(&self) -> u64 {
        self.successful_ips.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_targets: self.total_targets.load(Ordering::Relaxed),
            successful_ips: self.successful_ips.load(Ordering::Relaxed),
            reports_written: self.reports_written.load(Ordering::Relaxed),
            protocol_counts: self
                .protocol_counts
                .lock()
                .expect("stats poisoned")
                .iter()
                .map(|(proto, count)| (*proto, *count))
                .collect(),
            elapsed: self.started.elapsed(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_targets: u64,
    pub successful_ips: u64,
    pub reports_written: u64,
    pub protocol_counts: Vec<(Protocol, u64)>,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// The summary block appended to streaming output and printed by
    /// the CLI at end of scan.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n================== Scan Statistics ==================");
        let _ = writeln!(out, "Total Targets: {}", self.total_targets);
        let _ = writeln!(out, "Successful IPs: {}", self.successful_ips);
        let _ = writeln!(out, "\nProtocol Success Counts:");
        for (proto, count) in &self.protocol_counts {
            let _ = writeln!(out, "  {proto}: {count}");
        }
        let _ = writeln!(out, "\nTotal Time: {} ms", self.elapsed.as_millis());
        let _ = writeln!(out, "====================================================");
        out
    }
}
