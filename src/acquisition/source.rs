// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Feed sources
//!
//! A [`FeedSource`] ties together what one poller needs for its feed: the
//! transport, the decoder call matching the feed's payload, and the feed's
//! synthetic generator. The poller itself stays generic over the reading
//! type.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::decoder::{decode_metrics, decode_sensor};
use super::synthetic::{SyntheticMetricsGenerator, SyntheticSensorGenerator};
use super::{AcquisitionError, FeedReading, MetricsSnapshot, SensorReading};
use crate::config::{ConfigError, FieldBusConfig, HostMetricsConfig, RegisterLayout};
use crate::drivers::host_metrics::HostMetricsEndpoint;
use crate::drivers::{
    create_host_metrics_transport, FieldBusTransport, HostMetricsTransport, ModbusTcpTransport,
    TransportError,
};

/// Name of the field-bus environment feed
pub const FIELD_BUS_FEED: &str = "field_bus";
/// Name of the host hardware telemetry feed
pub const HOST_METRICS_FEED: &str = "host_metrics";

/// Everything a poller needs to acquire one feed
#[async_trait::async_trait]
pub trait FeedSource: Send + 'static {
    type Reading: FeedReading;

    fn name(&self) -> &str;

    /// Open the underlying transport
    async fn open(&mut self, timeout: Duration) -> Result<(), TransportError>;

    /// Read and decode one reading
    async fn poll(&mut self, timeout: Duration) -> Result<Self::Reading, AcquisitionError>;

    /// Release the underlying transport; a no-op when nothing is open
    async fn close(&mut self);

    /// Produce a substitute reading continuing from `last_good`
    fn synthesize(&mut self, last_good: Option<&Self::Reading>, at: DateTime<Utc>) -> Self::Reading;
}

/// SHT20 sensor read as holding registers
pub struct FieldBusSource {
    transport: Box<dyn FieldBusTransport>,
    unit_id: u8,
    start_address: u16,
    layout: RegisterLayout,
    generator: SyntheticSensorGenerator,
}

impl FieldBusSource {
    pub fn new(transport: Box<dyn FieldBusTransport>, config: &FieldBusConfig) -> Self {
        Self {
            transport,
            unit_id: config.unit_id,
            start_address: config.start_address,
            layout: config.layout.clone(),
            generator: SyntheticSensorGenerator::new(config.synthetic.clone()),
        }
    }

    /// Source reading the Modbus TCP gateway named by the configured endpoint
    pub fn from_config(config: &FieldBusConfig) -> Self {
        let transport = ModbusTcpTransport::new(config.polling.endpoint.trim());
        Self::new(Box::new(transport), config)
    }
}

#[async_trait::async_trait]
impl FeedSource for FieldBusSource {
    type Reading = SensorReading;

    fn name(&self) -> &str {
        FIELD_BUS_FEED
    }

    async fn open(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.transport.connect(timeout).await
    }

    async fn poll(&mut self, timeout: Duration) -> Result<SensorReading, AcquisitionError> {
        let words = self
            .transport
            .read_holding_registers(
                self.unit_id,
                self.start_address,
                self.layout.register_count,
                timeout,
            )
            .await?;
        Ok(decode_sensor(&words, &self.layout, Utc::now())?)
    }

    async fn close(&mut self) {
        self.transport.close().await;
    }

    fn synthesize(&mut self, last_good: Option<&SensorReading>, at: DateTime<Utc>) -> SensorReading {
        self.generator.next(last_good, at)
    }
}

/// Host component temperatures from a telemetry payload
pub struct HostMetricsSource {
    transport: Box<dyn HostMetricsTransport>,
    generator: SyntheticMetricsGenerator,
}

impl HostMetricsSource {
    pub fn new(transport: Box<dyn HostMetricsTransport>, config: &HostMetricsConfig) -> Self {
        Self {
            transport,
            generator: SyntheticMetricsGenerator::new(config.synthetic.clone()),
        }
    }

    /// Source using the driver selected by the configured endpoint
    pub fn from_config(config: &HostMetricsConfig) -> Result<Self, ConfigError> {
        let endpoint = HostMetricsEndpoint::parse(&config.polling.endpoint).ok_or_else(|| {
            ConfigError::UnsupportedEndpoint {
                endpoint: config.polling.endpoint.clone(),
                reason: "expected sysinfo, an http(s) URL or a file path".to_string(),
            }
        })?;
        Ok(Self::new(create_host_metrics_transport(&endpoint), config))
    }
}

#[async_trait::async_trait]
impl FeedSource for HostMetricsSource {
    type Reading = MetricsSnapshot;

    fn name(&self) -> &str {
        HOST_METRICS_FEED
    }

    async fn open(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.transport.connect(timeout).await
    }

    async fn poll(&mut self, timeout: Duration) -> Result<MetricsSnapshot, AcquisitionError> {
        let payload = self.transport.read_host_metrics(timeout).await?;
        Ok(decode_metrics(&payload, Utc::now())?)
    }

    async fn close(&mut self) {
        self.transport.close().await;
    }

    fn synthesize(&mut self, last_good: Option<&MetricsSnapshot>, at: DateTime<Utc>) -> MetricsSnapshot {
        self.generator.next(last_good, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{DecodeError, ReadingSource};
    use crate::drivers::{MockFieldBusTransport, MockHostMetricsTransport};
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_field_bus_source_reads_configured_block() {
        let config = FieldBusConfig {
            unit_id: 7,
            start_address: 1,
            ..FieldBusConfig::default()
        };
        let mut transport = MockFieldBusTransport::new();
        transport
            .expect_read_holding_registers()
            .with(eq(7u8), eq(1u16), eq(2u16), eq(Duration::from_millis(500)))
            .times(1)
            .returning(|_, _, _, _| Ok(vec![226, 512]));

        let mut source = FieldBusSource::new(Box::new(transport), &config);
        let reading = source.poll(Duration::from_millis(500)).await.unwrap();
        assert_eq!(reading.temperature, 22.6);
        assert_eq!(reading.humidity, 51.2);
        assert_eq!(reading.source, ReadingSource::Live);
    }

    #[tokio::test]
    async fn test_field_bus_source_reports_decode_errors() {
        let mut transport = MockFieldBusTransport::new();
        transport
            .expect_read_holding_registers()
            .returning(|_, _, _, _| Ok(vec![2000, 512]));

        let mut source = FieldBusSource::new(Box::new(transport), &FieldBusConfig::default());
        let result = source.poll(Duration::from_millis(500)).await;
        assert!(matches!(
            result,
            Err(AcquisitionError::Decode(DecodeError::OutOfRange { .. }))
        ));
    }

    #[tokio::test]
    async fn test_host_metrics_source_reports_transport_errors() {
        let mut transport = MockHostMetricsTransport::new();
        transport
            .expect_read_host_metrics()
            .returning(|t| Err(TransportError::Timeout(t)));

        let mut source = HostMetricsSource::new(Box::new(transport), &HostMetricsConfig::default());
        let result = source.poll(Duration::from_secs(1)).await;
        assert_eq!(
            result,
            Err(AcquisitionError::Transport(TransportError::Timeout(Duration::from_secs(1))))
        );
    }

    #[test]
    fn test_synthesized_readings_are_flagged() {
        let transport = MockHostMetricsTransport::new();
        let mut source = HostMetricsSource::new(Box::new(transport), &HostMetricsConfig::default());
        let snapshot = source.synthesize(None, Utc::now());
        assert_eq!(snapshot.source, ReadingSource::Synthetic);
        assert!(!snapshot.components.is_empty());
    }

    #[test]
    fn test_from_config_rejects_empty_endpoint() {
        let mut config = HostMetricsConfig::default();
        config.polling.endpoint = String::new();
        assert!(matches!(
            HostMetricsSource::from_config(&config),
            Err(ConfigError::UnsupportedEndpoint { .. })
        ));
    }
}
