// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus simulation module
//!
//! This module provides a Modbus TCP server that behaves like the SHT20
//! temperature/humidity sensor behind its gateway, for demos and end-to-end
//! tests of the field-bus feed without hardware.
//!
//! ## Usage
//!
//! The simulator can be started as part of the application daemon by
//! enabling the `simulator` configuration section, or on its own:
//!
//! ```no_run
//! use rust_labmonitor::config::RegisterLayout;
//! use rust_labmonitor::modbus::{serve, Sht20ModbusServer};
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> std::io::Result<()> {
//! let simulator = Sht20ModbusServer::new(0, RegisterLayout::default());
//! simulator.set_reading(23.4, 51.0).expect("valid reading");
//! let listener = TcpListener::bind("127.0.0.1:5020").await?;
//! serve(listener, simulator).await
//! # }
//! ```
//!
//! ## Register Map
//!
//! ### Holding and Input Registers (same block)
//!
//! - Register 0: Temperature (°C × 10, signed)
//! - Register 1: Relative humidity (%RH × 10)

pub mod modbus_server;
pub use modbus_server::{run_updater, serve, Sht20ModbusServer};
