use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ipnetwork::Ipv4Network;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use svcmap_types::{Target, TargetKind};

use crate::stats::ScanStats;

/// Hard cap on addresses expanded from a single range or CIDR line.
pub const MAX_EXPANSION: u64 = 1_048_576;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    pub emitted: u64,
    pub skipped: u64,
}

pub(crate) enum LineTargets {
    None,
    Single(Target),
    /// A run of consecutive addresses starting at `base`.
    Addresses { base: u32, count: u64 },
}

/// Classify one input line.
///
/// Empty and `#`/`;` comment lines produce nothing. A line with `/` is
/// CIDR (expansion includes network and broadcast addresses); a line
/// with `,` whose first two fields are IPv4 is an inclusive range;
/// anything else is a verbatim target. Oversized expansions truncate to
/// [`MAX_EXPANSION`] with a warning.
pub(crate) fn parse_line(raw: &str) -> LineTargets {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return LineTargets::None;
    }

    if line.contains('/') {
        return match line.parse::<Ipv4Network>() {
            Ok(network) => {
                let count = 1u64 << (32 - network.prefix());
                if count > MAX_EXPANSION {
                    warn!(
                        line,
                        total = count,
                        kept = MAX_EXPANSION,
                        "CIDR expansion truncated"
                    );
                }
                LineTargets::Addresses {
                    base: u32::from(network.network()),
                    count: count.min(MAX_EXPANSION),
                }
            }
            Err(e) => {
                warn!(line, error = %e, "invalid CIDR line dropped");
                LineTargets::None
            }
        };
    }

    if line.contains(',') {
        let mut fields = line.split(',');
        let first = fields.next().and_then(|f| f.trim().parse::<Ipv4Addr>().ok());
        let second = fields.next().and_then(|f| f.trim().parse::<Ipv4Addr>().ok());
        if let (Some(a), Some(b)) = (first, second) {
            let (lo, hi) = if u32::from(a) <= u32::from(b) {
                (u32::from(a), u32::from(b))
            } else {
                (u32::from(b), u32::from(a))
            };
            let count = (hi - lo) as u64 + 1;
            if count > MAX_EXPANSION {
                warn!(line, total = count, kept = MAX_EXPANSION, "range expansion truncated");
            }
            return LineTargets::Addresses {
                base: lo,
                count: count.min(MAX_EXPANSION),
            };
        }
        // Not an address range; the whole line is one target.
    }

    LineTargets::Single(Target::from_input(line))
}

/// Regular files under `path`, recursing directories in deterministic
/// name order.
pub(crate) fn collect_input_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if path.is_dir() {
        walk(path, &mut files);
    } else {
        files.push(path.to_path_buf());
    }
    files
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let mut entries: Vec<_> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(Result::ok).collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "unreadable directory skipped");
            return;
        }
    };
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => walk(&entry.path(), out),
            Ok(ft) if ft.is_file() => out.push(entry.path()),
            _ => {}
        }
    }
}

struct SkipState {
    active: bool,
    until: Option<Ipv4Addr>,
}

/// Stream targets from `source` into the bounded buffer, applying the
/// resume skip and cancelling promptly on shutdown.
///
/// In skip mode only IP targets are discarded: hostnames pass through,
/// and the target equal to `resume_after` is itself skipped before
/// normal emission resumes. If the resume point never appears the run
/// emits no IP targets, which is not an error (the input changed).
pub async fn run_ingester(
    source: PathBuf,
    resume_after: Option<Ipv4Addr>,
    tx: mpsc::Sender<Target>,
    cancel: CancellationToken,
    stats: Arc<ScanStats>,
) -> IngestSummary {
    let mut summary = IngestSummary::default();
    let mut skip = SkipState {
        active: resume_after.is_some(),
        until: resume_after,
    };

    'files: for file in collect_input_files(&source) {
        if cancel.is_cancelled() {
            break;
        }
        let handle = match File::open(&file).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "unreadable input file skipped");
                continue;
            }
        };

        let mut lines = BufReader::new(handle).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "read error, rest of file skipped");
                    break;
                }
            };

            match parse_line(&line) {
                LineTargets::None => {}
                LineTargets::Single(target) => {
                    if !emit(&tx, &cancel, target, &mut skip, &mut summary, &stats).await {
                        break 'files;
                    }
                }
                LineTargets::Addresses { base, count } => {
                    for i in 0..count {
                        let target = Target::from_ip(Ipv4Addr::from(base + i as u32));
                        if !emit(&tx, &cancel, target, &mut skip, &mut summary, &stats).await {
                            break 'files;
                        }
                    }
                }
            }
        }
    }

    if skip.active {
        warn!("resume point was never seen in the input; all IP targets were skipped");
    }
    info!(
        emitted = summary.emitted,
        skipped = summary.skipped,
        "input streaming complete"
    );
    summary
}

/// Returns false when the run is over (cancelled or consumer gone).
async fn emit(
    tx: &mpsc::Sender<Target>,
    cancel: &CancellationToken,
    target: Target,
    skip: &mut SkipState,
    summary: &mut IngestSummary,
    stats: &ScanStats,
) -> bool {
    if skip.active && target.kind() == TargetKind::Ip {
        summary.skipped += 1;
        if target.ip == skip.until {
            skip.active = false;
            info!(ip = %target.input, "resume point reached");
        }
        return true;
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(target) => {
            if sent.is_ok() {
                summary.emitted += 1;
                stats.target_admitted();
                true
            } else {
                false
            }
        }
    }
}
