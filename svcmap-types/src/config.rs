use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::Protocol;

/// Port selection strategy for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// Each protocol probes only its own default ports.
    ProtocolDefaults,
    /// Each protocol probes the union of all enabled protocols' ports.
    AllAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Append each harvested report to disk as it arrives.
    Stream,
    /// Accumulate in memory and write once at end of scan.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverBackend {
    /// hickory-resolver, preferred for throughput.
    Library,
    /// Blocking `ToSocketAddrs` lookup on the blocking pool.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    Report,
    Required,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text | OutputFormat::Report | OutputFormat::Required => "txt",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown output format: {0}")]
pub struct UnknownFormat(String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "report" => Ok(OutputFormat::Report),
            "required" | "required_format" | "required_fomat" => Ok(OutputFormat::Required),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub formats: Vec<OutputFormat>,
    pub directory: PathBuf,
    pub write_mode: WriteMode,
    pub to_console: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            formats: vec![OutputFormat::Text],
            directory: PathBuf::from("./result"),
            write_mode: WriteMode::Stream,
            to_console: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VendorOptions {
    pub enabled: bool,
    pub pattern_file: Option<PathBuf>,
    /// Accepted and stored; reserved for fuzzy matching.
    pub similarity_threshold: f64,
}

impl Default for VendorOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern_file: None,
            similarity_threshold: 0.8,
        }
    }
}

/// Fully-merged scanner configuration (defaults < config file < CLI).
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Reactor pool size; 0 means auto (1.5 x CPU).
    pub io_thread_count: usize,
    /// Orchestration/blocking pool size; 0 means auto.
    pub cpu_thread_count: usize,
    /// Probe launches per scheduler tick.
    pub batch_size: usize,
    pub dns_timeout: Duration,
    /// Zero selects the adaptive per-/24 timeout.
    pub probe_timeout: Duration,
    pub dns_backend: ResolverBackend,
    pub only_success: bool,
    /// Configured session ceiling; 0 means unconfigured (FD-derived).
    pub max_work_count: usize,
    /// Capacity of the ingester -> scheduler target buffer.
    pub targets_max_size: usize,
    /// Reports between checkpoint rewrites.
    pub checkpoint_interval: usize,
    pub result_flush_interval: Duration,
    pub probe_mode: ProbeMode,
    pub enabled_protocols: Vec<Protocol>,
    pub output: OutputOptions,
    pub vendor: VendorOptions,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            io_thread_count: 0,
            cpu_thread_count: 0,
            batch_size: 10_000,
            dns_timeout: Duration::from_millis(5_000),
            probe_timeout: Duration::from_millis(60_000),
            dns_backend: ResolverBackend::Library,
            only_success: false,
            max_work_count: 0,
            targets_max_size: 100_000,
            checkpoint_interval: 1_000,
            result_flush_interval: Duration::from_secs(5),
            probe_mode: ProbeMode::ProtocolDefaults,
            enabled_protocols: vec![
                Protocol::Smtp,
                Protocol::Pop3,
                Protocol::Imap,
                Protocol::Ftp,
            ],
            output: OutputOptions::default(),
            vendor: VendorOptions::default(),
        }
    }
}

impl ScannerConfig {
    pub fn protocol_enabled(&self, protocol: Protocol) -> bool {
        self.enabled_protocols.contains(&protocol)
    }

    pub fn set_protocol(&mut self, protocol: Protocol, enabled: bool) {
        if enabled {
            if !self.enabled_protocols.contains(&protocol) {
                self.enabled_protocols.push(protocol);
            }
        } else {
            self.enabled_protocols.retain(|p| *p != protocol);
        }
    }
}
