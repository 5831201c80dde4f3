// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;

use crate::acquisition::source::{FIELD_BUS_FEED, HOST_METRICS_FEED};
use crate::acquisition::synthetic::SyntheticSensorGenerator;
use crate::acquisition::{
    FeedStatePublisher, FieldBusSource, HostMetricsSource, MetricsSnapshot, Poller,
    SensorReading,
};
use crate::config::utils::validate_field_bus_endpoint;
use crate::config::{Config, SyntheticSensorConfig};
use crate::modbus::{run_updater, serve, Sht20ModbusServer};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the feed pollers and the auxiliary tasks of the monitoring process
///
/// One publisher per feed exists for the whole life of the daemon, so
/// consumers may subscribe before [`Daemon::launch`] and keep their handle
/// across restarts.
pub struct Daemon {
    config: Config,
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    field_bus: FeedStatePublisher<SensorReading>,
    host_metrics: FeedStatePublisher<MetricsSnapshot>,
    field_bus_poller: Option<Poller<FieldBusSource>>,
    host_metrics_poller: Option<Poller<HostMetricsSource>>,
    simulator: Option<(Sht20ModbusServer, SocketAddr)>,
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new(config: Config) -> Self {
        Daemon {
            config,
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            field_bus: FeedStatePublisher::new(FIELD_BUS_FEED),
            host_metrics: FeedStatePublisher::new(HOST_METRICS_FEED),
            field_bus_poller: None,
            host_metrics_poller: None,
            simulator: None,
        }
    }

    /// Launch all configured tasks based on configuration
    pub async fn launch(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        // The simulator goes first so a local field-bus feed finds it listening
        if self.config.simulator.enabled {
            self.start_simulator().await?;
        }

        if self.config.field_bus.enabled {
            self.start_field_bus()?;
        } else {
            info!("Field-bus feed disabled");
        }

        if self.config.host_metrics.enabled {
            self.start_host_metrics()?;
        } else {
            info!("Host-metrics feed disabled");
        }

        self.start_heartbeat()?;

        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Publisher of the environment sensor feed
    pub fn field_bus(&self) -> &FeedStatePublisher<SensorReading> {
        &self.field_bus
    }

    /// Publisher of the host component temperature feed
    pub fn host_metrics(&self) -> &FeedStatePublisher<MetricsSnapshot> {
        &self.host_metrics
    }

    /// Address the SHT20 simulator is listening on, once launched
    pub fn simulator_address(&self) -> Option<SocketAddr> {
        self.simulator.as_ref().map(|(_, addr)| *addr)
    }

    /// Handle on the simulator registers, once launched
    pub fn simulator(&self) -> Option<&Sht20ModbusServer> {
        self.simulator.as_ref().map(|(server, _)| server)
    }

    /// Ask every running feed to reconnect at its next tick
    pub fn reconnect_all(&mut self) {
        info!("Reconnect requested for all feeds");
        if let Some(poller) = self.field_bus_poller.as_mut() {
            poller.reconnect();
        }
        if let Some(poller) = self.host_metrics_poller.as_mut() {
            poller.reconnect();
        }
    }

    /// Start the SHT20 Modbus simulator and its updater
    async fn start_simulator(&mut self) -> Result<()> {
        let settings = &self.config.simulator;
        let bind = format!("{}:{}", settings.address, settings.port);
        info!("Starting SHT20 simulator on {}", bind);

        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("Failed to bind SHT20 simulator on {}", bind))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read simulator address")?;

        let field_bus = &self.config.field_bus;
        let service = Sht20ModbusServer::new(field_bus.start_address, field_bus.layout.clone());
        service
            .set_reading(
                field_bus.synthetic.default_temperature,
                field_bus.synthetic.default_humidity,
            )
            .context("Invalid initial simulator reading")?;

        let generator = SyntheticSensorGenerator::new(SyntheticSensorConfig {
            seed: settings.seed,
            ..field_bus.synthetic.clone()
        });
        let period = Duration::from_millis(settings.update_interval_ms);

        let server_task = {
            let service = service.clone();
            tokio::spawn(async move {
                serve(listener, service)
                    .await
                    .context("SHT20 simulator stopped")
            })
        };
        self.tasks.push(server_task);

        let running = self.running.clone();
        let updater_service = service.clone();
        let updater_task = tokio::spawn(async move {
            run_updater(updater_service, generator, period, running).await;
            Ok(())
        });
        self.tasks.push(updater_task);

        info!("SHT20 simulator listening on {}", local_addr);
        self.simulator = Some((service, local_addr));
        Ok(())
    }

    /// Start the field-bus poller
    fn start_field_bus(&mut self) -> Result<()> {
        let config = &self.config.field_bus;
        info!(
            "Starting field-bus feed on {} (unit {})",
            config.polling.endpoint, config.unit_id
        );

        validate_field_bus_endpoint(&config.polling.endpoint)
            .context("Invalid field-bus endpoint")?;
        let source = FieldBusSource::from_config(config);
        let mut poller = Poller::new(source, self.field_bus.clone());
        poller
            .start(config.polling.clone())
            .context("Failed to start field-bus poller")?;
        self.field_bus_poller = Some(poller);
        Ok(())
    }

    /// Start the host-metrics poller
    fn start_host_metrics(&mut self) -> Result<()> {
        let config = &self.config.host_metrics;
        info!("Starting host-metrics feed from {}", config.polling.endpoint);

        let source = HostMetricsSource::from_config(config)
            .context("Invalid host-metrics endpoint")?;
        let mut poller = Poller::new(source, self.host_metrics.clone());
        poller
            .start(config.polling.clone())
            .context("Failed to start host-metrics poller")?;
        self.host_metrics_poller = Some(poller);
        Ok(())
    }

    /// Start a heartbeat task that logs feed status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let field_bus = self.field_bus.clone();
        let host_metrics = self.host_metrics.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!(
                    "Daemon heartbeat: field_bus {}, host_metrics {}",
                    field_bus.connection_state(),
                    host_metrics.connection_state()
                );
                time::sleep(HEARTBEAT_PERIOD).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Stop the pollers, release their transports and end auxiliary tasks
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);

        if let Some(mut poller) = self.field_bus_poller.take() {
            poller.stop().await;
        }
        if let Some(mut poller) = self.host_metrics_poller.take() {
            poller.stop().await;
        }

        // The simulator, its updater and the heartbeat only wait on timers
        // or sockets, so they are aborted instead of drained
        for task in &self.tasks {
            task.abort();
        }
        self.simulator = None;

        for task in self.tasks.drain(..) {
            match time::timeout(TASK_JOIN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!("Daemon task ended with an error: {:#}", e),
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Daemon task did not stop within {:?}", TASK_JOIN_TIMEOUT),
            }
        }

        info!("Daemon stopped");
        Ok(())
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for task in &self.tasks {
            task.abort();
        }
    }
}
