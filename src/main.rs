use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use colored::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use devscope::cli::{Cli, Command, DiscoverArgs, PingArgs, TargetArgs};
use devscope::config::{DiscoveryConfig, PingConfig};
use devscope::credentials::{load_credentials_file, Credential};
use devscope::network::{filter_local, load_targets_file, merge_targets, parse_targets};
use devscope::output::OutputWriter;
use devscope::scanner::{DiscoveryScheduler, LatencyScanner};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Command::Discover(args) => run_discover(args, !cli.no_progress).await,
        Command::Ping(args) => run_ping(args, !cli.no_progress).await,
    };

    if let Err(e) = &result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn collect_targets(args: &TargetArgs) -> Result<Vec<IpAddr>> {
    let mut lists = Vec::new();
    for spec in &args.target {
        lists.push(parse_targets(spec)?);
    }
    if let Some(path) = &args.target_file {
        lists.push(load_targets_file(path)?);
    }

    let mut targets = merge_targets(lists);
    if args.exclude_local {
        targets = filter_local(targets);
    }
    if targets.is_empty() {
        bail!("No targets specified. Example: devscope discover 192.168.1.0/24 -u admin:admin");
    }
    Ok(targets)
}

fn collect_credentials(args: &DiscoverArgs) -> Result<Vec<Credential>> {
    let mut credentials = Vec::new();
    for spec in &args.users {
        credentials.push(Credential::parse_inline(spec)?);
    }
    if let Some(path) = &args.credentials {
        credentials.extend(load_credentials_file(path)?);
    }
    if credentials.is_empty() {
        bail!("No credentials given; use -u user:pass or --credentials <file>");
    }

    if let Some(secs) = args.timeout {
        credentials = credentials.into_iter().map(|c| c.with_timeout(secs)).collect();
    }
    Ok(credentials)
}

/// Ctrl-C flips the stop flag once; a second Ctrl-C is left to the default handler.
fn stop_on_interrupt(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing hosts already in progress");
            stop.store(true, Ordering::SeqCst);
        }
    });
}

async fn run_discover(args: DiscoverArgs, show_progress: bool) -> Result<()> {
    let targets = collect_targets(&args.targets)?;
    let credentials = collect_credentials(&args)?;
    info!(targets = targets.len(), credentials = credentials.len(), "Discovery input ready");

    let mut config = DiscoveryConfig {
        max_workers: args.workers,
        protocol_filter: args.protocol,
        show_progress,
        ..Default::default()
    };
    if let Some(secs) = args.timeout {
        config = config.with_connect_timeout(secs);
    }
    let scheduler = DiscoveryScheduler::with_network(config);
    stop_on_interrupt(scheduler.stop_handle());

    let report = scheduler.discover(&targets, &credentials).await?;

    OutputWriter::new(args.targets.output_format, args.targets.output_file.clone())
        .include_secrets(args.include_secrets)
        .write_inventory(&report)
}

async fn run_ping(args: PingArgs, show_progress: bool) -> Result<()> {
    let targets = collect_targets(&args.targets)?;

    let config = PingConfig {
        timeout: args.timeout,
        ping_count: args.count,
        ping_duration: args.duration,
        ping_interval: args.interval,
        concurrent_limit: args.concurrency,
        max_retries: args.retries,
        show_progress,
    };
    let scanner = LatencyScanner::new(config);
    stop_on_interrupt(scanner.stop_handle());

    let report = scanner.scan(&targets).await?;

    OutputWriter::new(args.targets.output_format, args.targets.output_file.clone())
        .write_ping_report(&report)
}
