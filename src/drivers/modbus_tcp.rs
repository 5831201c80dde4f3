// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP client for the SHT20 environment sensor
//!
//! The sensor sits behind a Modbus TCP gateway. This driver resolves the
//! configured `host:port` endpoint, opens a tokio-modbus client context and
//! performs holding register reads on behalf of the field-bus poller.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, warn};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use super::{with_timeout, FieldBusTransport, TransportError};

/// Field-bus transport over Modbus TCP
pub struct ModbusTcpTransport {
    endpoint: String,
    ctx: Option<Context>,
}

impl ModbusTcpTransport {
    /// Create a transport for `endpoint` (`host:port`); nothing is opened yet
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ctx: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn resolve(endpoint: &str) -> Result<SocketAddr, TransportError> {
        let mut addresses = tokio::net::lookup_host(endpoint).await.map_err(|e| {
            TransportError::ConnectionRefused(format!("cannot resolve '{}': {}", endpoint, e))
        })?;
        addresses.next().ok_or_else(|| {
            TransportError::ConnectionRefused(format!("no address found for '{}'", endpoint))
        })
    }
}

fn map_connect_error(endpoint: &str, err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut => TransportError::ConnectionRefused(format!(
            "connection to {} timed out: {}",
            endpoint, err
        )),
        _ => TransportError::ConnectionRefused(format!("{}: {}", endpoint, err)),
    }
}

#[async_trait::async_trait]
impl FieldBusTransport for ModbusTcpTransport {
    async fn connect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.ctx.is_some() {
            return Ok(());
        }

        // The client context is not Sync, so no borrow of self may cross an await
        let endpoint = self.endpoint.clone();
        let socket_addr = Self::resolve(&endpoint).await?;
        debug!("Connecting to Modbus gateway at {}", socket_addr);

        let ctx = with_timeout(timeout, async {
            tcp::connect(socket_addr)
                .await
                .map_err(|e| map_connect_error(&endpoint, e))
        })
        .await?;

        self.ctx = Some(ctx);
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<u16>, TransportError> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionLost("not connected".to_string()))?;

        ctx.set_slave(Slave(unit_id));

        with_timeout(timeout, async {
            match ctx.read_holding_registers(start, count).await {
                Ok(Ok(words)) => Ok(words),
                Ok(Err(exception)) => Err(TransportError::ProtocolError(format!(
                    "unit {} answered with exception {:?}",
                    unit_id, exception
                ))),
                Err(err) => Err(TransportError::ConnectionLost(err.to_string())),
            }
        })
        .await
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let endpoint = self.endpoint.clone();
            debug!("Closing Modbus connection to {}", endpoint);
            if let Err(err) = ctx.disconnect().await {
                warn!("Error while disconnecting from {}: {}", endpoint, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_without_connection_is_connection_lost() {
        let mut transport = ModbusTcpTransport::new("127.0.0.1:1");
        let result = transport
            .read_holding_registers(1, 1, 2, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(TransportError::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_endpoint_is_refused() {
        let mut transport = ModbusTcpTransport::new("not a socket address");
        let result = transport.connect(Duration::from_millis(200)).await;
        assert!(matches!(result, Err(TransportError::ConnectionRefused(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let mut transport = ModbusTcpTransport::new("127.0.0.1:502");
        transport.close().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_transport_runs_on_a_spawned_task() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut transport: Box<dyn FieldBusTransport> =
            Box::new(ModbusTcpTransport::new(addr.to_string()));
        let result = tokio::spawn(async move {
            let result = transport.connect(Duration::from_millis(500)).await;
            transport.close().await;
            result
        })
        .await
        .unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionRefused(_))));
    }
}
