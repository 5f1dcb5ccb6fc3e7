use std::fs::OpenOptions;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use svcmap_output::{formatter_for, output_paths, render_json, OutputError, ReportFormatter};
use svcmap_types::{Checkpoint, OutputFormat, ScanReport, WriteMode};
use svcmap_vendor::VendorDetector;

use crate::checkpoint::{utc_timestamp, ProgressManager};
use crate::stats::ScanStats;

pub struct WriterOptions {
    pub formats: Vec<OutputFormat>,
    pub directory: PathBuf,
    pub write_mode: WriteMode,
    pub only_success: bool,
    pub flush_interval: Duration,
    pub checkpoint_interval: usize,
    pub to_console: bool,
    /// Where to persist updated vendor patterns at end of scan.
    pub vendor_file: Option<PathBuf>,
}

struct StreamSink {
    format: OutputFormat,
    formatter: Box<dyn ReportFormatter>,
    file: std::fs::File,
    echo_console: bool,
}

/// Single consumer of the report queue: applies vendor classification,
/// maintains statistics, formats and persists reports, and asks the
/// progress manager for a checkpoint every `checkpoint_interval`
/// reports. The checkpoint survives cancellation and is deleted only on
/// clean completion.
pub async fn run_result_writer(
    mut reports_rx: mpsc::Receiver<ScanReport>,
    options: WriterOptions,
    progress: ProgressManager,
    input_hash: String,
    stats: Arc<ScanStats>,
    mut vendor: Option<VendorDetector>,
    cancel: CancellationToken,
) -> Result<(), OutputError> {
    std::fs::create_dir_all(&options.directory)?;
    let paths = output_paths(&options.directory, &options.formats);

    let streaming = options.write_mode == WriteMode::Stream;
    let mut sinks: Vec<StreamSink> = Vec::new();
    let mut json_selected = false;
    let mut json_path = None;

    for (format, path) in &paths {
        if *format == OutputFormat::Json {
            json_selected = true;
            json_path = Some(path.clone());
            continue;
        }
        if !streaming {
            continue;
        }
        let Some(formatter) = formatter_for(*format, options.only_success) else {
            continue;
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(false);
        let mut sink = StreamSink {
            format: *format,
            formatter,
            file,
            echo_console: options.to_console && matches!(format, OutputFormat::Text | OutputFormat::Report),
        };
        if fresh {
            let mut preamble = String::new();
            if matches!(format, OutputFormat::Text | OutputFormat::Report) {
                preamble.push_str("Scan Results\n============\n");
            }
            if let Some(header) = sink.formatter.header() {
                preamble.push_str(&header);
            }
            if !preamble.is_empty() {
                sink.file.write_all(preamble.as_bytes())?;
            }
        }
        sinks.push(sink);
    }

    // Reports held back for end-of-run rendering: everything in final
    // mode, JSON-bound reports in either mode.
    let mut retained: Vec<ScanReport> = Vec::new();
    let mut since_checkpoint = 0usize;
    let mut last_ip = String::new();
    let mut last_flush = tokio::time::Instant::now();

    loop {
        match tokio::time::timeout(options.flush_interval, reports_rx.recv()).await {
            Ok(Some(mut report)) => {
                if let Some(detector) = vendor.as_mut() {
                    apply_vendor(detector, &mut report);
                }
                stats.record_report(&report);
                if !report.ip.is_empty() {
                    last_ip = report.ip.clone();
                }

                let mut write_failed = false;
                if streaming {
                    for sink in sinks.iter_mut() {
                        match sink.formatter.format(&report) {
                            Ok(block) if !block.is_empty() => {
                                if sink.echo_console {
                                    print!("{block}");
                                }
                                if let Err(e) = sink.file.write_all(block.as_bytes()) {
                                    warn!(error = %e, "output write failed; continuing");
                                    write_failed = true;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "report formatting failed"),
                        }
                    }
                }
                if !streaming || json_selected {
                    retained.push(report);
                }

                // A failed batch does not advance the checkpoint.
                if !write_failed {
                    since_checkpoint += 1;
                }
                if since_checkpoint >= options.checkpoint_interval && !last_ip.is_empty() {
                    save_checkpoint(&progress, &last_ip, &input_hash, &stats);
                    since_checkpoint = 0;
                }

                if last_flush.elapsed() >= options.flush_interval {
                    flush_sinks(&mut sinks);
                    last_flush = tokio::time::Instant::now();
                }
            }
            Ok(None) => break,
            Err(_) => {
                flush_sinks(&mut sinks);
                last_flush = tokio::time::Instant::now();
            }
        }
    }

    // End of scan: final-mode rendering and the JSON artifact.
    if !streaming {
        for (format, path) in &paths {
            if *format == OutputFormat::Json {
                continue;
            }
            let Some(mut formatter) = formatter_for(*format, options.only_success) else {
                continue;
            };
            let mut body = String::new();
            if let Some(header) = formatter.header() {
                body.push_str(&header);
            }
            for report in &retained {
                body.push_str(&formatter.format(report)?);
            }
            std::fs::write(path, &body)?;
            if options.to_console && matches!(format, OutputFormat::Text | OutputFormat::Report) {
                print!("{body}");
            }
        }
    }
    if json_selected {
        if let Some(path) = &json_path {
            let body = render_json(&retained, options.only_success)?;
            std::fs::write(path, body)?;
        }
    }

    // Streaming trailer with run statistics.
    if streaming {
        let summary = stats.snapshot().render_summary();
        for sink in sinks.iter_mut() {
            if sink.echo_console {
                print!("{summary}");
            }
            // Only the human-readable files get the trailer.
            if matches!(sink.format, OutputFormat::Text | OutputFormat::Report) {
                let _ = sink.file.write_all(summary.as_bytes());
            }
        }
    }
    flush_sinks(&mut sinks);

    if let (Some(detector), Some(path)) = (vendor.as_ref(), options.vendor_file.as_ref()) {
        if let Err(e) = detector.save(path) {
            warn!(error = %e, "failed to persist vendor patterns");
        }
    }

    if cancel.is_cancelled() {
        // Interrupted: leave the latest state behind for resume.
        if !last_ip.is_empty() {
            save_checkpoint(&progress, &last_ip, &input_hash, &stats);
        }
        info!("writer stopped on cancellation; checkpoint retained");
    } else {
        progress.clear();
        info!(reports = stats.reports_written(), "result writer finished");
    }
    Ok(())
}

fn save_checkpoint(progress: &ProgressManager, last_ip: &str, input_hash: &str, stats: &ScanStats) {
    let checkpoint = Checkpoint {
        last_ip: last_ip.to_string(),
        processed_count: stats.reports_written(),
        successful_count: stats.successful_ips(),
        timestamp: utc_timestamp(),
        input_file_hash: input_hash.to_string(),
    };
    if let Err(e) = progress.save(&checkpoint) {
        warn!(error = %e, "failed to save checkpoint");
    }
}

fn flush_sinks(sinks: &mut [StreamSink]) {
    for sink in sinks {
        if let Err(e) = sink.file.flush() {
            warn!(error = %e, "output flush failed");
        }
    }
}

fn apply_vendor(detector: &mut VendorDetector, report: &mut ScanReport) {
    for pr in report.protocols.iter_mut() {
        if !pr.accessible || pr.attributes.banner.is_empty() {
            continue;
        }
        if let Some(id) = detector.detect(&pr.attributes.banner) {
            pr.attributes.vendor = detector.name(id).to_string();
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            format!("{}:{}", pr.host, pr.port).hash(&mut hasher);
            detector.record_match(id, hasher.finish());
        }
    }
}
