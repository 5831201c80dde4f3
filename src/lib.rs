// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust lab monitor library
//!
//! This library polls a Modbus TCP temperature/humidity sensor and the host
//! component temperatures, keeps bounded histories of the live readings and
//! publishes immutable per-feed snapshots to the presentation layer.
//! Substitute readings are produced while a feed is down.

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod drivers;
pub mod modbus;
pub mod utility;

pub use config::Config;
