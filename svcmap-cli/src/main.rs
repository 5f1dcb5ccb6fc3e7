mod args;
mod config_file;

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use svcmap_core::ScanEngine;
use svcmap_resolve::{LibraryResolver, Resolve, SystemResolver};
use svcmap_types::{ResolverBackend, ScannerConfig, WriteMode};

use args::Args;
use config_file::{apply_cli_args, apply_file_config, load_file_config};

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    if !args.scan && !args.dns_test {
        eprintln!("No mode selected. Use --scan or --dns-test.");
        return ExitCode::FAILURE;
    }

    let file_config = load_file_config(&args.config);
    let mut config = ScannerConfig::default();
    apply_file_config(&file_config, &mut config);
    apply_cli_args(&args, &mut config);

    init_tracing(&args, file_config.logging.level.as_deref());

    let io_threads = effective_io_threads(&config);
    let cpu_threads = config.cpu_thread_count.max(2);
    info!(io_threads, cpu_threads, "thread pools initialized");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(io_threads)
        .max_blocking_threads(cpu_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = if args.dns_test {
        runtime.block_on(dns_test(&args.domains, &config))
    } else {
        runtime.block_on(scan(&args.domains, config))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Reactor pool default is 1.5 x CPU when unconfigured.
fn effective_io_threads(config: &ScannerConfig) -> usize {
    if config.io_thread_count > 0 {
        return config.io_thread_count;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cpus * 3 / 2).max(2)
}

fn init_tracing(args: &Args, config_level: Option<&str>) {
    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        match config_level {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") | Some("warning") => "warn",
            Some("error") => "error",
            _ => "info",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

async fn scan(input: &Path, config: ScannerConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown requested; letting in-flight probes finish");
        signal_cancel.cancel();
    });

    let final_mode = config.output.write_mode == WriteMode::Final;
    let to_console = config.output.to_console;
    let engine = ScanEngine::new(config);
    let snapshot = engine
        .run(input, cancel)
        .await
        .context("scan failed")?;

    // Streaming mode already wrote the trailer to the output file.
    if final_mode || !to_console {
        print!("{}", snapshot.render_summary());
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// `--dns-test`: resolve every non-comment line and print the answers.
async fn dns_test(input: &Path, config: &ScannerConfig) -> anyhow::Result<()> {
    let resolver: Box<dyn Resolve> = match config.dns_backend {
        ResolverBackend::Library => Box::new(LibraryResolver::from_system()?),
        ResolverBackend::System => Box::new(SystemResolver),
    };
    let timeout = if config.dns_timeout.is_zero() {
        Duration::from_secs(5)
    } else {
        config.dns_timeout
    };

    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read {}", input.display()))?;

    println!("DNS Resolution Test Results:");
    println!("============================");
    for line in raw.lines() {
        let name = line.trim();
        if name.is_empty() || name.starts_with('#') || name.starts_with(';') {
            continue;
        }
        let outcome = resolver.resolve(name, timeout).await;
        match outcome.ip {
            Some(ip) => {
                if outcome.mx_records.is_empty() {
                    println!("{name} -> {ip}");
                } else {
                    println!("{name} -> {ip} (MX: {})", outcome.mx_records.len());
                }
            }
            None => println!("{name} -> ERROR: {}", outcome.error),
        }
    }
    Ok(())
}
