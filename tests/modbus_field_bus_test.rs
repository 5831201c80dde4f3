// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests of the field-bus feed against the SHT20 simulator
//!
//! A simulator is started on an OS-assigned port, then the real Modbus TCP
//! driver and poller read it the way the daemon does.

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_modbus::prelude::*;

use rust_labmonitor::acquisition::decoder::decode_sensor;
use rust_labmonitor::acquisition::{
    ConnectionState, FeedState, FeedStatePublisher, FieldBusSource, Poller, ReadingSource,
    SensorReading,
};
use rust_labmonitor::config::{FieldBusConfig, RegisterLayout};
use rust_labmonitor::drivers::{FieldBusTransport, ModbusTcpTransport, TransportError};
use rust_labmonitor::modbus::{serve, Sht20ModbusServer};

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Start a simulator holding 24.5 °C / 48.2 %RH in the background
async fn start_simulator() -> (SocketAddr, Sht20ModbusServer, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let simulator = Sht20ModbusServer::new(0, RegisterLayout::default());
    simulator.set_reading(24.5, 48.2).unwrap();

    let service = simulator.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, service).await {
            eprintln!("Server error: {}", e);
        }
    });

    (addr, simulator, handle)
}

fn field_bus_config(addr: SocketAddr) -> FieldBusConfig {
    let mut config = FieldBusConfig::default();
    config.polling.endpoint = addr.to_string();
    config.polling.poll_interval_ms = 50;
    config.polling.timeout_ms = 1000;
    config.polling.degraded_threshold = 2;
    config.polling.disconnect_threshold = 50;
    config.polling.table_sample_interval_ms = 0;
    config
}

async fn wait_for<F>(
    updates: &mut watch::Receiver<Arc<FeedState<SensorReading>>>,
    predicate: F,
) -> Arc<FeedState<SensorReading>>
where
    F: Fn(&FeedState<SensorReading>) -> bool,
{
    time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let state = updates.borrow_and_update();
                if predicate(&state) {
                    return state.clone();
                }
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .expect("feed did not reach the expected state in time")
}

#[tokio::test]
async fn test_transport_reads_simulator_registers() {
    setup();
    let (addr, _simulator, server) = start_simulator().await;

    let mut transport = ModbusTcpTransport::new(addr.to_string());
    transport.connect(Duration::from_secs(1)).await.unwrap();
    let registers = transport
        .read_holding_registers(1, 0, 2, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(registers, vec![245, 482]);

    let reading = decode_sensor(&registers, &RegisterLayout::default(), chrono::Utc::now()).unwrap();
    assert_eq!(reading.temperature, 24.5);
    assert_eq!(reading.humidity, 48.2);

    // Outside the simulated block
    let result = transport
        .read_holding_registers(1, 10, 2, Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(TransportError::ProtocolError(_))));

    transport.close().await;
    server.abort();
}

#[tokio::test]
async fn test_connection_refused_without_server() {
    setup();
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut transport = ModbusTcpTransport::new(addr.to_string());
    let result = transport.connect(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(TransportError::ConnectionRefused(_))));
}

#[tokio::test]
async fn test_poller_reaches_live_reading() {
    setup();
    let (addr, simulator, server) = start_simulator().await;
    let config = field_bus_config(addr);

    let publisher = FeedStatePublisher::new("field_bus");
    let mut updates = publisher.watch();
    let mut poller = Poller::new(FieldBusSource::from_config(&config), publisher.clone());
    poller.start(config.polling.clone()).unwrap();

    let state = wait_for(&mut updates, |state| {
        state.connection == ConnectionState::Connected
    })
    .await;
    let latest = state.latest.as_ref().unwrap();
    assert_eq!(latest.source, ReadingSource::Live);
    assert_eq!(latest.temperature, 24.5);
    assert_eq!(latest.humidity, 48.2);
    assert!(state.last_success.is_some());

    // The next ticks pick up a new measurement
    simulator.set_reading(26.3, 51.0).unwrap();
    let state = wait_for(&mut updates, |state| {
        state
            .latest
            .as_ref()
            .is_some_and(|reading| reading.temperature == 26.3)
    })
    .await;
    assert_eq!(state.connection, ConnectionState::Connected);
    assert!(state.table_history.len() >= 2);
    assert!(state
        .table_history
        .iter()
        .all(|reading| reading.source == ReadingSource::Live));

    poller.stop().await;
    assert_eq!(publisher.connection_state(), ConnectionState::Disconnected);
    server.abort();
}

#[tokio::test]
async fn test_out_of_range_registers_degrade_the_feed() {
    setup();
    let (addr, _simulator, server) = start_simulator().await;
    let config = field_bus_config(addr);

    let publisher = FeedStatePublisher::new("field_bus");
    let mut updates = publisher.watch();
    let mut poller = Poller::new(FieldBusSource::from_config(&config), publisher.clone());
    poller.start(config.polling.clone()).unwrap();

    wait_for(&mut updates, |state| {
        state.connection == ConnectionState::Connected
    })
    .await;

    // 200.0 °C is outside the sensor range
    let mut client = tcp::connect_slave(addr, Slave(1)).await.unwrap();
    client.write_single_register(0, 2000).await.unwrap().unwrap();
    drop(client);

    let state = wait_for(&mut updates, |state| {
        state.connection == ConnectionState::Degraded
    })
    .await;
    assert!(state.consecutive_failures >= 2);
    assert!(state
        .table_history
        .iter()
        .all(|reading| reading.temperature == 24.5 && reading.source == ReadingSource::Live));
    let latest = state.latest.as_ref().unwrap();
    assert!((-40.0..=125.0).contains(&latest.temperature));

    poller.stop().await;
    server.abort();
}
