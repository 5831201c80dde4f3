// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transport drivers for the monitored feeds
//!
//! This module defines the transport capabilities consumed by the pollers and
//! their concrete implementations:
//! - [`FieldBusTransport`]: register reads from the SHT20 environment sensor
//!   over Modbus ([`modbus_tcp::ModbusTcpTransport`])
//! - [`HostMetricsTransport`]: raw host hardware telemetry payloads
//!   ([`host_metrics::SysinfoTransport`], [`host_metrics::HttpJsonTransport`],
//!   [`host_metrics::FileTransport`])
//!
//! Drivers only move bytes and register words. Decoding and validation belong
//! to [`crate::acquisition::decoder`].

pub mod host_metrics;
pub mod modbus_tcp;

pub use host_metrics::{create_host_metrics_transport, FileTransport, HttpJsonTransport, SysinfoTransport};
pub use modbus_tcp::ModbusTcpTransport;

use std::time::Duration;
use thiserror::Error;

/// Connectivity failures reported by a transport driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The operation did not complete within its deadline
    #[error("transport operation timed out after {0:?}")]
    Timeout(Duration),
    /// The remote end could not be reached or refused the connection
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    /// An established connection failed or is no longer open
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The remote end answered with something the protocol does not allow
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Register-based field-bus transport
///
/// A transport owns at most one connection. `close` must release it and be a
/// no-op when nothing is open.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FieldBusTransport: Send {
    /// Open the connection to the field-bus device
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Read `count` holding registers starting at `start` from unit `unit_id`
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError>;

    /// Release the connection
    async fn close(&mut self);
}

/// Host hardware telemetry transport
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HostMetricsTransport: Send {
    /// Prepare the telemetry source
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Fetch one raw telemetry payload
    async fn read_host_metrics(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Release the telemetry source
    async fn close(&mut self);
}

/// Run `future` with a deadline, mapping expiry to [`TransportError::Timeout`]
pub(crate) async fn with_timeout<T, F>(timeout: Duration, future: F) -> Result<T, TransportError>
where
    F: std::future::Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}
