use std::path::PathBuf;

use clap::Parser;

/// svcmap — multi-protocol network service fingerprinter
#[derive(Parser, Debug)]
#[command(name = "svcmap", version, about = "Multi-protocol network service fingerprinter")]
pub struct Args {
    /// Input file (or directory) of domains, IPs, IP ranges, or CIDR blocks
    #[arg(short = 'd', long = "domains", value_name = "PATH")]
    pub domains: PathBuf,

    /// Run the protocol scan
    #[arg(long = "scan")]
    pub scan: bool,

    /// Resolve every target and print the answers without probing
    #[arg(long = "dns-test")]
    pub dns_test: bool,

    /// Configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = "./config/scanner_config.json")]
    pub config: PathBuf,

    /// Output directory
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Output format: text, json, csv, report, required ("txt" = text)
    #[arg(short = 'f', long = "format", value_name = "FORMAT")]
    pub format: Option<String>,

    /// Reactor pool size (network I/O)
    #[arg(long = "io-threads", value_name = "N")]
    pub io_threads: Option<usize>,

    /// Orchestration pool size (parsing, output)
    #[arg(long = "cpu-threads", value_name = "N")]
    pub cpu_threads: Option<usize>,

    /// Legacy thread count: sets IO threads to N and CPU threads to max(1, N/4)
    #[arg(short = 't', long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Comma-separated protocol list replacing the enabled set
    /// (SMTP,POP3,IMAP,HTTP,FTP,TELNET,SSH)
    #[arg(short = 'p', long = "protocols", value_name = "CSV")]
    pub protocols: Option<String>,

    /// Disable SMTP scanning
    #[arg(long = "no-smtp")]
    pub no_smtp: bool,

    /// Disable POP3 scanning
    #[arg(long = "no-pop3")]
    pub no_pop3: bool,

    /// Disable IMAP scanning
    #[arg(long = "no-imap")]
    pub no_imap: bool,

    /// Disable FTP scanning
    #[arg(long = "no-ftp")]
    pub no_ftp: bool,

    /// Enable HTTP scanning
    #[arg(long = "enable-http")]
    pub enable_http: bool,

    /// Enable FTP scanning
    #[arg(long = "enable-ftp")]
    pub enable_ftp: bool,

    /// Enable Telnet scanning
    #[arg(long = "enable-telnet")]
    pub enable_telnet: bool,

    /// Enable SSH scanning
    #[arg(long = "enable-ssh")]
    pub enable_ssh: bool,

    /// Probe timeout in milliseconds; 0 selects the adaptive timeout
    #[arg(long = "timeout", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Probe launches per scheduler pass
    #[arg(short = 'b', long = "batch-size", value_name = "N")]
    pub batch_size: Option<usize>,

    /// Only record successful probes (hide failures)
    #[arg(long = "only-success")]
    pub only_success: bool,

    /// Probe every available port with every protocol
    #[arg(long = "scan-all-ports")]
    pub scan_all_ports: bool,

    /// Vendor pattern file
    #[arg(long = "vendor-file", value_name = "PATH")]
    pub vendor_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose", conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}
