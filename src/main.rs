//! sqlmem-diag - version 0.1.0
//!
//! SQL Server hidden-memory diagnostics CLI. This is the main entry point
//! that wires the collector to the driver (or the simulator) and handles
//! subcommands.

mod cli;
mod config;
mod render;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use config::{resolve_config, EffectiveConfig};
use sqlmem_diag::collect::{CollectorOptions, EventSourceFactory, MemoryCollector};
use sqlmem_diag::driver::SummaryClient;
use sqlmem_diag::sim::{SimulatedControlChannel, SyntheticEventSource};
use sqlmem_diag::trace::device::DeviceEventSource;
use sqlmem_diag::trace::event::EventSource;
use sqlmem_diag::DiagError;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(level: &LogLevel) {
    let log_level = match level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Builds the collector against either the real driver or the simulator.
fn build_collector(args: &Args, effective: &EffectiveConfig) -> Result<MemoryCollector, DiagError> {
    let options = CollectorOptions {
        enable_event_tracing: effective.enable_event_tracing,
    };

    if args.simulate {
        warn!("running against simulated sources, not the driver");
        let client = SummaryClient::new(Box::new(SimulatedControlChannel::new()));
        let factory: EventSourceFactory =
            Box::new(|| Ok(Box::new(SyntheticEventSource::new()) as Box<dyn EventSource>));
        return Ok(MemoryCollector::new(client, factory, options));
    }

    let client = SummaryClient::open_device(&effective.device_path)?;
    let device_path = effective.device_path.clone();
    let factory: EventSourceFactory = Box::new(move || {
        DeviceEventSource::open(&device_path).map(|s| Box::new(s) as Box<dyn EventSource>)
    });
    Ok(MemoryCollector::new(client, factory, options))
}

/// Captures one report and prints it.
async fn run_once(collector: &MemoryCollector, json: bool) -> Result<(), DiagError> {
    let report = collector.capture_snapshot().await?;
    if json {
        println!("{}", report.to_json_string());
    } else {
        render::print_report(&report);
    }
    Ok(())
}

/// Captures reports periodically until ctrl-c.
async fn run_watch(collector: &MemoryCollector, interval_seconds: u64, json: bool) {
    info!("watching host memory every {}s, ctrl-c to stop", interval_seconds);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = ticker.tick() => {
                match collector.capture_snapshot().await {
                    Ok(report) => {
                        if json {
                            println!("{}", report.to_json_string());
                        } else {
                            println!("--- {} ---", report.captured_at.format("%Y-%m-%d %H:%M:%S UTC"));
                            render::print_report(&report);
                        }
                    }
                    Err(e) => error!("collection cycle failed: {}", e),
                }
            }
        }
    }
}

/// Verifies the control channel opens and a summary parses.
fn command_check(args: &Args, effective: &EffectiveConfig) -> bool {
    println!("🔍 sqlmem-diag - Driver Check");
    println!("=============================");

    let client = if args.simulate {
        println!("   ℹ️  Using simulated control channel");
        SummaryClient::new(Box::new(SimulatedControlChannel::new()))
    } else {
        println!("\n📁 Opening {} ...", effective.device_path.display());
        match SummaryClient::open_device(&effective.device_path) {
            Ok(client) => {
                println!("   ✅ Control device accessible");
                client
            }
            Err(e) => {
                println!("   ❌ {}", e);
                return false;
            }
        }
    };

    println!("\n💾 Querying memory summary...");
    match client.get_summary() {
        Ok(summary) => {
            println!(
                "   ✅ Summary v{}: {:.1} GiB total, {} processes",
                summary.version,
                summary.total_physical_gib(),
                summary.processes.len()
            );
            true
        }
        Err(e) => {
            println!("   ❌ Summary query failed: {}", e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let effective = resolve_config(&args)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("configuration invalid")?;
    setup_logging(&effective.log_level);

    match &args.command {
        Some(Commands::Check) => {
            if !command_check(&args, &effective) {
                std::process::exit(1);
            }
        }
        Some(Commands::Watch { interval }) => {
            let collector = build_collector(&args, &effective)?;
            let interval_seconds = interval.unwrap_or(effective.interval_seconds);
            run_watch(&collector, interval_seconds.max(1), args.json).await;
        }
        None => {
            let collector = build_collector(&args, &effective)?;
            run_once(&collector, args.json).await?;
        }
    }

    Ok(())
}
