use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use svcmap_types::{OutputFormat, ProbeMode, Protocol, ResolverBackend, ScannerConfig, WriteMode};

use crate::args::Args;

pub const DEFAULT_CONFIG_PATH: &str = "./config/scanner_config.json";

/// Optional JSON configuration file. Every key is optional; missing
/// keys keep their built-in defaults.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub scanner: ScannerSection,
    #[serde(default)]
    pub protocols: HashMap<String, ProtocolSection>,
    #[serde(default)]
    pub dns: DnsSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub vendor: VendorSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScannerSection {
    pub io_thread_count: Option<usize>,
    pub cpu_thread_count: Option<usize>,
    pub batch_size: Option<usize>,
    pub dns_timeout_ms: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub only_success: Option<bool>,
    pub max_work_count: Option<usize>,
    pub targets_max_size: Option<usize>,
    pub checkpoint_interval: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProtocolSection {
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DnsSection {
    pub resolver_type: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_mx_records: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputSection {
    pub format: Option<FormatSpec>,
    pub directory: Option<PathBuf>,
    pub write_mode: Option<String>,
    pub to_console: Option<bool>,
}

/// `output.format` accepts either a string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FormatSpec {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub console_enabled: Option<bool>,
    pub file_enabled: Option<bool>,
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VendorSection {
    pub enabled: Option<bool>,
    pub pattern_file: Option<PathBuf>,
    pub similarity_threshold: Option<f64>,
}

/// Load the config file, falling back to the default path when the
/// named file is absent, and to built-in defaults when neither parses.
pub fn load_file_config(requested: &Path) -> FileConfig {
    let path = if requested.exists() {
        requested.to_path_buf()
    } else {
        if requested != Path::new(DEFAULT_CONFIG_PATH) {
            warn!(requested = %requested.display(), "config file not found, trying default path");
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => {
            warn!(path = %path.display(), "config file not found, using defaults");
            return FileConfig::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file invalid, using defaults");
            FileConfig::default()
        }
    }
}

fn parse_formats(spec: &FormatSpec) -> Vec<OutputFormat> {
    let names: Vec<&str> = match spec {
        FormatSpec::One(name) => vec![name.as_str()],
        FormatSpec::Many(names) => names.iter().map(String::as_str).collect(),
    };
    let mut formats = Vec::new();
    for name in names {
        match name.parse::<OutputFormat>() {
            Ok(format) => {
                if !formats.contains(&format) {
                    formats.push(format);
                }
            }
            Err(e) => warn!(%e, "unknown output format in config ignored"),
        }
    }
    formats
}

/// Apply the file config over the built-in defaults.
pub fn apply_file_config(file: &FileConfig, config: &mut ScannerConfig) {
    let s = &file.scanner;
    if let Some(v) = s.io_thread_count {
        config.io_thread_count = v;
    }
    if let Some(v) = s.cpu_thread_count {
        config.cpu_thread_count = v;
    }
    if let Some(v) = s.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = s.dns_timeout_ms.or(file.dns.timeout_ms) {
        config.dns_timeout = Duration::from_millis(v);
    }
    if let Some(v) = s.probe_timeout_ms {
        config.probe_timeout = Duration::from_millis(v);
    }
    if let Some(v) = s.only_success {
        config.only_success = v;
    }
    if let Some(v) = s.max_work_count {
        config.max_work_count = v;
    }
    if let Some(v) = s.targets_max_size {
        config.targets_max_size = v;
    }
    if let Some(v) = s.checkpoint_interval {
        config.checkpoint_interval = v;
    }

    for (name, section) in &file.protocols {
        let (Ok(protocol), Some(enabled)) = (name.parse::<Protocol>(), section.enabled) else {
            continue;
        };
        config.set_protocol(protocol, enabled);
    }

    if let Some(kind) = &file.dns.resolver_type {
        config.dns_backend = match kind.to_ascii_lowercase().as_str() {
            "system" | "blocking" => ResolverBackend::System,
            _ => ResolverBackend::Library,
        };
    }

    if let Some(spec) = &file.output.format {
        let formats = parse_formats(spec);
        if !formats.is_empty() {
            config.output.formats = formats;
        }
    }
    if let Some(dir) = &file.output.directory {
        config.output.directory = dir.clone();
    }
    if let Some(mode) = &file.output.write_mode {
        config.output.write_mode = match mode.as_str() {
            "stream" => WriteMode::Stream,
            "final" => WriteMode::Final,
            other => {
                warn!(mode = other, "invalid write_mode, falling back to stream");
                WriteMode::Stream
            }
        };
    }
    if let Some(v) = file.output.to_console {
        config.output.to_console = v;
    }

    if let Some(v) = file.vendor.enabled {
        config.vendor.enabled = v;
    }
    if let Some(path) = &file.vendor.pattern_file {
        config.vendor.pattern_file = Some(path.clone());
    }
    if let Some(v) = file.vendor.similarity_threshold {
        config.vendor.similarity_threshold = v;
    }
}

/// Apply CLI arguments over the file config (CLI wins).
pub fn apply_cli_args(args: &Args, config: &mut ScannerConfig) {
    if let Some(v) = args.io_threads {
        config.io_thread_count = v;
    }
    if let Some(v) = args.cpu_threads {
        config.cpu_thread_count = v;
    }
    // Legacy --threads only applies when the split flags are absent.
    if let (Some(threads), None, None) = (args.threads, args.io_threads, args.cpu_threads) {
        config.io_thread_count = threads;
        config.cpu_thread_count = (threads / 4).max(1);
    }

    if let Some(v) = args.timeout_ms {
        config.probe_timeout = Duration::from_millis(v);
    }
    if let Some(v) = args.batch_size {
        config.batch_size = v;
    }
    if args.only_success {
        config.only_success = true;
    }
    if args.scan_all_ports {
        config.probe_mode = ProbeMode::AllAvailable;
    }

    if let Some(list) = &args.protocols {
        config.enabled_protocols.clear();
        for name in list.split(',') {
            match name.parse::<Protocol>() {
                Ok(protocol) => config.set_protocol(protocol, true),
                Err(e) => warn!(%e, "unknown protocol in --protocols ignored"),
            }
        }
    }
    if args.no_smtp {
        config.set_protocol(Protocol::Smtp, false);
    }
    if args.no_pop3 {
        config.set_protocol(Protocol::Pop3, false);
    }
    if args.no_imap {
        config.set_protocol(Protocol::Imap, false);
    }
    if args.no_ftp {
        config.set_protocol(Protocol::Ftp, false);
    }
    if args.enable_http {
        config.set_protocol(Protocol::Http, true);
    }
    if args.enable_ftp {
        config.set_protocol(Protocol::Ftp, true);
    }
    if args.enable_telnet {
        config.set_protocol(Protocol::Telnet, true);
    }
    if args.enable_ssh {
        config.set_protocol(Protocol::Ssh, true);
    }

    if let Some(dir) = &args.output {
        config.output.directory = dir.clone();
    }
    if let Some(format) = &args.format {
        match format.parse::<OutputFormat>() {
            Ok(format) => config.output.formats = vec![format],
            Err(e) => warn!(%e, "unknown --format ignored"),
        }
    }
    if let Some(path) = &args.vendor_file {
        config.vendor.pattern_file = Some(path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["svcmap", "--domains", "targets.txt", "--scan"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn file_config_overrides_defaults() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "scanner": {"batch_size": 500, "probe_timeout_ms": 1500, "max_work_count": 2000},
                "protocols": {"HTTP": {"enabled": true}, "SMTP": {"enabled": false}},
                "output": {"format": ["csv", "json"], "write_mode": "final"},
                "dns": {"resolver_type": "system"}
            }"#,
        )
        .unwrap();

        let mut config = ScannerConfig::default();
        apply_file_config(&file, &mut config);

        assert_eq!(config.batch_size, 500);
        assert_eq!(config.probe_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_work_count, 2000);
        assert!(config.protocol_enabled(Protocol::Http));
        assert!(!config.protocol_enabled(Protocol::Smtp));
        assert_eq!(
            config.output.formats,
            vec![OutputFormat::Csv, OutputFormat::Json]
        );
        assert_eq!(config.output.write_mode, WriteMode::Final);
        assert_eq!(config.dns_backend, ResolverBackend::System);
    }

    #[test]
    fn invalid_write_mode_falls_back_to_stream() {
        let file: FileConfig =
            serde_json::from_str(r#"{"output": {"write_mode": "sideways"}}"#).unwrap();
        let mut config = ScannerConfig::default();
        apply_file_config(&file, &mut config);
        assert_eq!(config.output.write_mode, WriteMode::Stream);
    }

    #[test]
    fn cli_overrides_file_config() {
        let mut config = ScannerConfig {
            batch_size: 500,
            ..Default::default()
        };
        apply_cli_args(&args(&["--batch-size", "64", "--timeout", "0"]), &mut config);
        assert_eq!(config.batch_size, 64);
        assert!(config.probe_timeout.is_zero());
    }

    #[test]
    fn protocols_flag_replaces_the_enabled_set() {
        let mut config = ScannerConfig::default();
        apply_cli_args(&args(&["--protocols", "SMTP,IMAP"]), &mut config);
        assert_eq!(
            config.enabled_protocols,
            vec![Protocol::Smtp, Protocol::Imap]
        );
    }

    #[test]
    fn legacy_threads_derives_cpu_pool() {
        let mut config = ScannerConfig::default();
        apply_cli_args(&args(&["--threads", "8"]), &mut config);
        assert_eq!(config.io_thread_count, 8);
        assert_eq!(config.cpu_thread_count, 2);

        let mut config = ScannerConfig::default();
        apply_cli_args(&args(&["--threads", "8", "--io-threads", "12"]), &mut config);
        assert_eq!(config.io_thread_count, 12);
        assert_eq!(config.cpu_thread_count, 0);
    }

    #[test]
    fn format_txt_alias_and_scan_all_ports() {
        let mut config = ScannerConfig::default();
        apply_cli_args(&args(&["--format", "txt", "--scan-all-ports"]), &mut config);
        assert_eq!(config.output.formats, vec![OutputFormat::Text]);
        assert_eq!(config.probe_mode, ProbeMode::AllAvailable);
    }
}
