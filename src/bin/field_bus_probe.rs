// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use rust_labmonitor::acquisition::decoder::decode_sensor;
use rust_labmonitor::acquisition::monitoring::MonitoringRow;
use rust_labmonitor::config::{Config, EnvironmentThresholds, RegisterLayout};
use rust_labmonitor::drivers::{FieldBusTransport, ModbusTcpTransport};

/// One-shot read of the SHT20 registers through a Modbus TCP gateway
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus gateway address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus gateway port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Modbus unit id of the sensor
    #[clap(long, default_value = "1")]
    unit_id: u8,

    /// First holding register of the measurement block
    #[clap(long, default_value = "0")]
    start_address: u16,

    /// Read timeout in milliseconds
    #[clap(long, default_value = "3000")]
    timeout_ms: u64,

    /// Take the register layout and thresholds from this configuration file
    #[clap(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let (layout, thresholds) = match &args.config {
        Some(path) => {
            let config = Config::from_file(path)?;
            (config.field_bus.layout, config.environment)
        }
        None => (RegisterLayout::default(), EnvironmentThresholds::default()),
    };

    let endpoint = format!("{}:{}", args.address, args.port);
    let timeout = Duration::from_millis(args.timeout_ms);
    println!("Connecting to Modbus gateway at {}", endpoint);

    let mut transport = ModbusTcpTransport::new(endpoint.clone());
    transport
        .connect(timeout)
        .await
        .with_context(|| format!("Cannot connect to {}", endpoint))?;

    println!(
        "Reading {} holding registers starting at address {} (unit {})",
        layout.register_count, args.start_address, args.unit_id
    );
    let registers = transport
        .read_holding_registers(args.unit_id, args.start_address, layout.register_count, timeout)
        .await;
    transport.close().await;
    let registers = registers.context("Register read failed")?;

    println!("Raw register values: {:?}", registers);

    let reading = decode_sensor(&registers, &layout, Utc::now())
        .context("Registers do not hold a valid measurement")?;
    let row = MonitoringRow::from_reading(&reading, &thresholds);
    println!("Temperature = {:.1} °C", row.temperature);
    println!("Humidity    = {:.1} %RH", row.humidity);
    println!("Status      = {:?}, cooling {:?}", row.status, row.cooling);

    Ok(())
}
