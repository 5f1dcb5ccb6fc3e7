use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use svcmap_output::OutputError;
use svcmap_probe::build_engines;
use svcmap_resolve::{LibraryResolver, Resolve, ResolveError, SystemResolver};
use svcmap_timing::LatencyMap;
use svcmap_types::{ResolverBackend, ScannerConfig};
use svcmap_vendor::VendorDetector;

use crate::admission::effective_session_cap;
use crate::checkpoint::{input_file_hash, ProgressManager};
use crate::ingest::run_ingester;
use crate::scheduler::Scheduler;
use crate::stats::{ScanStats, StatsSnapshot};
use crate::writer::{run_result_writer, WriterOptions};

/// Capacity of the session -> writer report queue.
const REPORT_QUEUE_DEPTH: usize = 1_024;

const DEFAULT_VENDOR_FILE: &str = "./config/vendors.json";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input path not found: {0}")]
    MissingInput(PathBuf),
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolveError),
    #[error("output error: {0}")]
    Output(#[from] OutputError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    TaskJoin(String),
}

/// Wires the pipeline together: admission cap, checkpoint resume,
/// ingester, scheduler, and result writer.
pub struct ScanEngine {
    config: ScannerConfig,
}

impl ScanEngine {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        input: &Path,
        cancel: CancellationToken,
    ) -> Result<StatsSnapshot, EngineError> {
        if !input.exists() {
            return Err(EngineError::MissingInput(input.to_path_buf()));
        }

        let cap = effective_session_cap(self.config.max_work_count);
        let progress = ProgressManager::new(input, &self.config.output.directory);
        let input_hash = input_file_hash(input);

        let stats = Arc::new(ScanStats::new());
        let resume_after: Option<Ipv4Addr> = match progress.load() {
            Some(checkpoint) => {
                stats.preload(checkpoint.processed_count, checkpoint.successful_count);
                if !checkpoint.input_file_hash.is_empty()
                    && checkpoint.input_file_hash != input_hash
                {
                    warn!("input file changed since checkpoint; resume may skip nothing");
                }
                checkpoint.last_ip.parse().ok()
            }
            None => None,
        };

        let resolver: Arc<dyn Resolve> = match self.config.dns_backend {
            ResolverBackend::Library => Arc::new(LibraryResolver::from_system()?),
            ResolverBackend::System => Arc::new(SystemResolver),
        };
        let latency = Arc::new(LatencyMap::new());
        let engines = build_engines(&self.config.enabled_protocols);
        info!(
            cap,
            protocols = engines.len(),
            resume = resume_after.is_some(),
            "scan starting"
        );

        let vendor_file = self
            .config
            .vendor
            .pattern_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VENDOR_FILE));
        let vendor = if self.config.vendor.enabled {
            match VendorDetector::load(&vendor_file) {
                Ok(detector) => Some(detector),
                Err(e) => {
                    warn!(file = %vendor_file.display(), error = %e, "vendor patterns unavailable");
                    None
                }
            }
        } else {
            None
        };
        let vendor_save = vendor.is_some().then(|| vendor_file.clone());

        let (targets_tx, targets_rx) = mpsc::channel(self.config.targets_max_size.max(1));
        let (reports_tx, reports_rx) = mpsc::channel(REPORT_QUEUE_DEPTH);

        let ingester = tokio::spawn(run_ingester(
            input.to_path_buf(),
            resume_after,
            targets_tx,
            cancel.clone(),
            Arc::clone(&stats),
        ));

        let writer_options = WriterOptions {
            formats: self.config.output.formats.clone(),
            directory: self.config.output.directory.clone(),
            write_mode: self.config.output.write_mode,
            only_success: self.config.only_success,
            flush_interval: self.config.result_flush_interval,
            checkpoint_interval: self.config.checkpoint_interval.max(1),
            to_console: self.config.output.to_console,
            vendor_file: vendor_save,
        };
        let writer = tokio::spawn(run_result_writer(
            reports_rx,
            writer_options,
            progress,
            input_hash,
            Arc::clone(&stats),
            vendor,
            cancel.clone(),
        ));

        let scheduler = Scheduler::new(cap, &self.config, engines, resolver, latency);
        scheduler.run(targets_rx, reports_tx, cancel).await;

        ingester
            .await
            .map_err(|e| EngineError::TaskJoin(e.to_string()))?;
        writer
            .await
            .map_err(|e| EngineError::TaskJoin(e.to_string()))??;

        Ok(stats.snapshot())
    }
}
