// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poller and connection manager
//!
//! One [`Poller`] runs one feed. Its background task ticks on a fixed
//! interval; every tick is handled by [`FeedWorker::poll_once`]:
//!
//! ```text
//!                 open ok            read ok
//! Disconnected ──────────▶ (unverified) ─────────▶ Connected
//!      ▲   │ open failed        │ read failed         │ ▲ read failed
//!      │   └──▶ Disconnected    ▼                     ▼ │ (< degraded)
//!      │                     Degraded ◀───────────────┘ │
//!      │  failures ≥ disconnect │        read ok        │
//!      └────────────────────────┴───────────────────────┘
//! ```
//!
//! While disconnected, reconnect attempts follow [`ReconnectBackoff`] and
//! every tick publishes a synthetic reading. Transport and decode failures
//! are recovered here and only surface as the published connection state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::shared_state::{FeedState, FeedStatePublisher};
use super::source::FeedSource;
use super::{AcquisitionError, ConnectionState};
use crate::config::{ConfigError, PollingConfig};
use crate::drivers::TransportError;
use crate::utility::history_buffer::{SampledHistory, Timestamped};

/// Errors returned by [`Poller::start`]
#[derive(Debug, Error)]
pub enum PollerError {
    #[error("invalid polling configuration: {0}")]
    Config(#[from] ConfigError),
    /// The poll task ended abnormally and took the feed source with it
    #[error("feed source was lost by a failed poll task")]
    SourceLost,
}

/// Commands accepted by a running poll task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerCommand {
    /// Reset the backoff and poll right away
    Reconnect,
}

/// Capped reconnect schedule
///
/// Each failed attempt schedules the next one after the following step of
/// the list; the last step is reused once the list is exhausted. An empty
/// list allows an attempt on every tick.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    steps: Vec<Duration>,
    failures: usize,
    next_attempt: Option<Instant>,
}

impl ReconnectBackoff {
    pub fn new(steps_ms: &[u64]) -> Self {
        Self {
            steps: steps_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
            failures: 0,
            next_attempt: None,
        }
    }

    /// Whether a connection attempt may be made at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_attempt.is_none_or(|at| now >= at)
    }

    /// Delay applied after the next failure
    pub fn next_delay(&self) -> Option<Duration> {
        let last = self.steps.len().checked_sub(1)?;
        self.steps.get(self.failures.min(last)).copied()
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.next_attempt = self.next_delay().map(|delay| now + delay);
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }
}

/// State of one feed, advanced one tick at a time
///
/// The worker exclusively owns the source, its connection and the feed's
/// histories. Everything readers see goes through the publisher.
pub struct FeedWorker<S: FeedSource> {
    source: S,
    publisher: FeedStatePublisher<S::Reading>,
    config: PollingConfig,
    connection: ConnectionState,
    /// The transport holds an open connection
    connected: bool,
    /// The open connection produced at least one good read
    verified: bool,
    consecutive_failures: u32,
    last_good: Option<S::Reading>,
    latest: Option<S::Reading>,
    last_success: Option<DateTime<Utc>>,
    chart: SampledHistory<S::Reading>,
    table: SampledHistory<S::Reading>,
    backoff: ReconnectBackoff,
}

impl<S: FeedSource> FeedWorker<S> {
    pub fn new(
        source: S,
        publisher: FeedStatePublisher<S::Reading>,
        config: PollingConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(source, publisher, config))
    }

    fn build(source: S, publisher: FeedStatePublisher<S::Reading>, config: PollingConfig) -> Self {
        Self {
            source,
            publisher,
            connection: ConnectionState::Disconnected,
            connected: false,
            verified: false,
            consecutive_failures: 0,
            last_good: None,
            latest: None,
            last_success: None,
            chart: SampledHistory::new(config.chart_history_capacity, config.chart_sample_interval()),
            table: SampledHistory::new(config.table_history_capacity, config.table_sample_interval()),
            backoff: ReconnectBackoff::new(&config.reconnect_backoff_ms),
            config,
        }
    }

    /// Apply a new configuration, keeping the newest history items
    pub fn reconfigure(&mut self, config: PollingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.apply(config);
        Ok(())
    }

    fn apply(&mut self, config: PollingConfig) {
        self.chart
            .reconfigure(config.chart_history_capacity, config.chart_sample_interval());
        self.table
            .reconfigure(config.table_history_capacity, config.table_sample_interval());
        if config.reconnect_backoff_ms != self.config.reconnect_backoff_ms {
            self.backoff = ReconnectBackoff::new(&config.reconnect_backoff_ms);
        }
        self.config = config;
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn reset_backoff(&mut self) {
        self.backoff.reset();
    }

    fn name(&self) -> String {
        self.source.name().to_string()
    }

    fn set_connection(&mut self, next: ConnectionState) {
        if self.connection != next {
            info!("Feed '{}': {} -> {}", self.source.name(), self.connection, next);
            self.connection = next;
        }
    }

    fn synthesize(&mut self) -> S::Reading {
        self.source.synthesize(self.last_good.as_ref(), Utc::now())
    }

    fn publish(&self) -> Arc<FeedState<S::Reading>> {
        self.publisher.publish(FeedState {
            feed: self.source.name().to_string(),
            revision: 0,
            connection: self.connection,
            latest: self.latest.clone(),
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
            chart_history: self.chart.snapshot(),
            table_history: self.table.snapshot(),
            published_at: Utc::now(),
        })
    }

    /// Run exactly one tick and return the state it published
    pub async fn poll_once(&mut self) -> Arc<FeedState<S::Reading>> {
        let timeout = self.config.timeout();

        if !self.connected {
            if !self.backoff.is_due(Instant::now()) {
                debug!("Feed '{}': waiting for reconnect backoff", self.source.name());
                self.latest = Some(self.synthesize());
                return self.publish();
            }

            self.set_connection(ConnectionState::Connecting);
            self.publish();

            let opened = match time::timeout(timeout, self.source.open(timeout)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            };
            if let Err(err) = opened {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let delay = self.backoff.next_delay().unwrap_or(self.config.poll_interval());
                self.backoff.record_failure(Instant::now());
                warn!(
                    "Feed '{}': connection attempt failed: {} (next attempt in {:?})",
                    self.source.name(),
                    err,
                    delay
                );
                self.set_connection(ConnectionState::Disconnected);
                self.latest = Some(self.synthesize());
                return self.publish();
            }

            debug!("Feed '{}': transport opened", self.source.name());
            self.connected = true;
            self.verified = false;
            self.consecutive_failures = 0;
        }

        let result = match time::timeout(timeout, self.source.poll(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(AcquisitionError::Transport(TransportError::Timeout(timeout))),
        };
        match result {
            Ok(reading) => self.record_success(reading),
            Err(err) => self.record_failure(err).await,
        }
        self.publish()
    }

    fn record_success(&mut self, reading: S::Reading) {
        if self.consecutive_failures > 0 {
            info!(
                "Feed '{}': read succeeded after {} failures",
                self.source.name(),
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.verified = true;
        self.backoff.reset();
        self.last_success = Some(reading.timestamp());
        for (history, kept) in [("chart", &mut self.chart), ("table", &mut self.table)] {
            if let Err(err) = kept.offer(reading.clone()) {
                warn!(
                    "Feed '{}': live reading left out of the {} history: {}",
                    self.source.name(),
                    history,
                    err
                );
            }
        }
        self.last_good = Some(reading.clone());
        self.latest = Some(reading);
        self.set_connection(ConnectionState::Connected);
    }

    async fn record_failure(&mut self, err: AcquisitionError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures >= self.config.disconnect_threshold {
            warn!(
                "Feed '{}': {} consecutive failures, dropping connection (last error: {})",
                self.source.name(),
                self.consecutive_failures,
                err
            );
            // Marked closed before the await: a stop landing mid-close must not close again
            self.connected = false;
            self.verified = false;
            self.source.close().await;
            self.backoff.record_failure(Instant::now());
            self.set_connection(ConnectionState::Disconnected);
            self.latest = Some(self.synthesize());
            return;
        }

        if self.consecutive_failures == 1 {
            warn!("Feed '{}': read failed: {}", self.source.name(), err);
        } else {
            debug!(
                "Feed '{}': read failed ({} in a row): {}",
                self.source.name(),
                self.consecutive_failures,
                err
            );
        }

        // An unverified connection never reports Connected on a failed read
        if self.consecutive_failures >= self.config.degraded_threshold || !self.verified {
            self.set_connection(ConnectionState::Degraded);
        } else {
            self.set_connection(ConnectionState::Connected);
        }
        if self.latest.is_none() {
            self.latest = Some(self.synthesize());
        }
    }

    /// Close the connection if one is open and publish `Disconnected`
    pub async fn release(&mut self) -> Arc<FeedState<S::Reading>> {
        if self.connected {
            debug!("Feed '{}': closing transport", self.source.name());
            self.connected = false;
            self.verified = false;
            self.source.close().await;
        }
        self.set_connection(ConnectionState::Disconnected);
        self.publish()
    }
}

/// Poll loop: ticks until stopped, then releases the transport
async fn run_worker<S: FeedSource>(
    mut worker: FeedWorker<S>,
    mut stop: oneshot::Receiver<()>,
    mut commands: mpsc::UnboundedReceiver<PollerCommand>,
) -> FeedWorker<S> {
    let name = worker.name();
    let mut interval = time::interval(worker.config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        "Poller for '{}' started (interval {:?}, timeout {:?})",
        name,
        worker.config.poll_interval(),
        worker.config.timeout()
    );

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            command = commands.recv() => match command {
                Some(PollerCommand::Reconnect) => {
                    info!("Feed '{}': reconnect requested", name);
                    worker.reset_backoff();
                    interval.reset();
                }
                None => break,
            },
            _ = interval.tick() => {}
        }

        // Stop must not wait for a slow transport
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = worker.poll_once() => {}
        }
    }

    worker.release().await;
    info!("Poller for '{}' stopped", name);
    worker
}

struct RunningTask<S: FeedSource> {
    handle: JoinHandle<FeedWorker<S>>,
    stop: oneshot::Sender<()>,
    commands: mpsc::UnboundedSender<PollerCommand>,
}

/// Background polling of one feed
///
/// # Example
///
/// ```no_run
/// use rust_labmonitor::acquisition::{FeedStatePublisher, FieldBusSource, Poller};
/// use rust_labmonitor::config::FieldBusConfig;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = FieldBusConfig::default();
/// let publisher = FeedStatePublisher::new("field_bus");
/// let mut poller = Poller::new(FieldBusSource::from_config(&config), publisher.clone());
///
/// poller.start(config.polling.clone())?;
/// let state = publisher.current();
/// println!("{} (synthetic: {})", state.connection, state.is_synthetic());
/// poller.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Poller<S: FeedSource> {
    feed: String,
    publisher: FeedStatePublisher<S::Reading>,
    /// Source waiting for the first start
    source: Option<S>,
    /// Worker returned by the last stopped task
    idle: Option<FeedWorker<S>>,
    task: Option<RunningTask<S>>,
}

impl<S: FeedSource> Poller<S> {
    pub fn new(source: S, publisher: FeedStatePublisher<S::Reading>) -> Self {
        Self {
            feed: source.name().to_string(),
            publisher,
            source: Some(source),
            idle: None,
            task: None,
        }
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn publisher(&self) -> &FeedStatePublisher<S::Reading> {
        &self.publisher
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.handle.is_finished())
    }

    /// Connection state of the last publish; never blocks
    pub fn current_state(&self) -> ConnectionState {
        self.publisher.connection_state()
    }

    /// Start polling with `config`
    ///
    /// A no-op while already running. After a `stop`, the same source,
    /// histories and generator state are reused; histories are resized to the
    /// new capacities.
    pub fn start(&mut self, config: PollingConfig) -> Result<(), PollerError> {
        if self.is_running() {
            debug!("Poller for '{}' already running", self.feed);
            return Ok(());
        }
        config.validate()?;

        if let Some(task) = self.task.take() {
            error!("Poll task for '{}' ended unexpectedly", self.feed);
            task.handle.abort();
        }

        let worker = match (self.idle.take(), self.source.take()) {
            (Some(mut worker), _) => {
                worker.apply(config);
                worker
            }
            (None, Some(source)) => FeedWorker::build(source, self.publisher.clone(), config),
            (None, None) => return Err(PollerError::SourceLost),
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(worker, stop_rx, command_rx));
        self.task = Some(RunningTask {
            handle,
            stop: stop_tx,
            commands: command_tx,
        });
        Ok(())
    }

    /// Stop polling and release the transport
    ///
    /// Cancels an in-flight transport wait. Safe to call in any state.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        // The task may already be gone; joining below covers both cases
        let _ = task.stop.send(());
        drop(task.commands);

        match task.handle.await {
            Ok(worker) => self.idle = Some(worker),
            Err(err) => {
                error!("Poll task for '{}' failed: {}", self.feed, err);
                let current = self.publisher.current();
                self.publisher.publish(FeedState {
                    connection: ConnectionState::Disconnected,
                    ..(*current).clone()
                });
            }
        }
    }

    /// Reset the reconnect backoff and poll immediately
    pub fn reconnect(&mut self) {
        if let Some(task) = &self.task {
            if task.commands.send(PollerCommand::Reconnect).is_err() {
                warn!("Poll task for '{}' is not accepting commands", self.feed);
            }
        } else if let Some(worker) = self.idle.as_mut() {
            worker.reset_backoff();
        }
    }
}

impl<S: FeedSource> Drop for Poller<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            // Best effort: the task closes the transport on its way out
            let _ = task.stop.send(());
        }
    }
}
