// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the lab environment monitor
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tokio::signal;

use rust_labmonitor::acquisition::monitoring::{HostSummary, MonitoringRow};
use rust_labmonitor::config::{self, Config};
use rust_labmonitor::daemon::Daemon;

/// Lab environment and host temperature monitor
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Modbus TCP endpoint of the SHT20 gateway (host:port)
    #[arg(long)]
    field_bus_endpoint: Option<String>,

    /// Host-metrics endpoint: sysinfo, an http(s) URL or a JSON file
    #[arg(long)]
    host_metrics_endpoint: Option<String>,

    /// Do not poll the field-bus sensor
    #[arg(long)]
    no_field_bus: bool,

    /// Do not poll the host metrics
    #[arg(long)]
    no_host_metrics: bool,

    /// Run the SHT20 Modbus simulator
    #[arg(long)]
    simulator: Option<bool>,

    /// Simulator bind address
    #[arg(long)]
    simulator_address: Option<String>,

    /// Simulator port
    #[arg(long)]
    simulator_port: Option<u16>,

    /// Seed of the synthetic generators, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.field_bus_endpoint.clone(),
        args.host_metrics_endpoint.clone(),
        args.no_field_bus,
        args.no_host_metrics,
        args.simulator,
        args.simulator_address.clone(),
        args.simulator_port,
        args.seed,
    );
    // Command line overrides go through the same checks as the file
    config::utils::validate_specific_rules(&config)
        .map_err(|err| anyhow::anyhow!("Invalid command line override: {}", err))?;

    info!("Starting in daemon mode");
    let thresholds = config.environment.clone();
    let mut daemon = Daemon::new(config);

    daemon.field_bus().subscribe(move |state| {
        if let Some(reading) = &state.latest {
            let row = MonitoringRow::from_reading(reading, &thresholds);
            info!(
                "field_bus [{}] {:.1} °C {:.1} %RH {:?}/{:?} ({:?})",
                state.connection, row.temperature, row.humidity, row.status, row.cooling, row.source
            );
        }
    });
    daemon.host_metrics().subscribe(|state| {
        if let Some(snapshot) = &state.latest {
            let summary = HostSummary::from_snapshot(snapshot);
            match &summary.hottest {
                Some(hottest) => info!(
                    "host_metrics [{}] {} components, hottest {} at {:.1} °C ({:?})",
                    state.connection,
                    summary.component_count,
                    hottest.label,
                    hottest.temperature,
                    summary.source
                ),
                None => info!(
                    "host_metrics [{}] {} components ({:?})",
                    state.connection, summary.component_count, summary.source
                ),
            }
        }
    });

    daemon.launch().await?;

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => warn!("Error waiting for shutdown signal: {}", err),
    }
    daemon.shutdown().await?;

    Ok(())
}
