// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Published feed state
//!
//! Each feed owns one [`FeedStatePublisher`]. The feed worker builds a
//! complete [`FeedState`] at the end of every tick and publishes it as a
//! single replacement of an `Arc`, so readers always see one whole tick and
//! never wait on the poll path.
//!
//! Readers can:
//! - take a snapshot with [`FeedStatePublisher::current`]
//! - register a callback with [`FeedStatePublisher::subscribe`]
//! - await changes through [`FeedStatePublisher::watch`]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use super::{ConnectionState, FeedReading, ReadingSource};

/// Handle returned by [`FeedStatePublisher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Immutable snapshot of one feed, as published after a tick
#[derive(Debug, Clone, Serialize)]
pub struct FeedState<R> {
    /// Feed name
    pub feed: String,
    /// Strictly increasing publication counter, 0 before the first publish
    pub revision: u64,
    pub connection: ConnectionState,
    /// Reading to display now, live or synthetic
    pub latest: Option<R>,
    pub consecutive_failures: u32,
    /// Time of the last successful live read
    pub last_success: Option<DateTime<Utc>>,
    /// Coarse history for charts, oldest first
    pub chart_history: Vec<R>,
    /// Fine history for the monitoring table, oldest first
    pub table_history: Vec<R>,
    pub published_at: DateTime<Utc>,
}

impl<R> FeedState<R> {
    /// State of a feed that never polled
    pub fn initial(feed: impl Into<String>) -> Self {
        Self {
            feed: feed.into(),
            revision: 0,
            connection: ConnectionState::Disconnected,
            latest: None,
            consecutive_failures: 0,
            last_success: None,
            chart_history: Vec::new(),
            table_history: Vec::new(),
            published_at: Utc::now(),
        }
    }
}

impl<R: FeedReading> FeedState<R> {
    /// Whether the displayed reading is a substitute
    pub fn is_synthetic(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|r| r.source() == ReadingSource::Synthetic)
    }
}

type Callback<R> = Arc<dyn Fn(&FeedState<R>) + Send + Sync>;

struct Inner<R> {
    feed: String,
    sender: watch::Sender<Arc<FeedState<R>>>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback<R>)>>,
    next_subscription: AtomicU64,
    /// Serializes publishers so revisions reach readers in order
    revision: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single writer, many readers distribution of a feed's state
pub struct FeedStatePublisher<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for FeedStatePublisher<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for FeedStatePublisher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedStatePublisher")
            .field("feed", &self.inner.feed)
            .field("revision", &*lock(&self.inner.revision))
            .finish()
    }
}

impl<R: FeedReading> FeedStatePublisher<R> {
    pub fn new(feed: impl Into<String>) -> Self {
        let feed = feed.into();
        let (sender, _) = watch::channel(Arc::new(FeedState::initial(feed.clone())));
        Self {
            inner: Arc::new(Inner {
                feed,
                sender,
                subscribers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                revision: Mutex::new(0),
            }),
        }
    }

    pub fn feed(&self) -> &str {
        &self.inner.feed
    }

    /// Latest published state; never blocks on the poll path
    pub fn current(&self) -> Arc<FeedState<R>> {
        Arc::clone(&self.inner.sender.borrow())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.sender.borrow().connection
    }

    /// Call `callback` after every publish until unsubscribed
    ///
    /// Callbacks run on the publishing task, outside any lock. They should
    /// return quickly.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FeedState<R>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.subscribers).push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription; `false` if it was unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.inner.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    /// Receiver notified on every publish, for async consumers
    pub fn watch(&self) -> watch::Receiver<Arc<FeedState<R>>> {
        self.inner.sender.subscribe()
    }

    /// Replace the published state
    ///
    /// `feed`, `revision` and `published_at` are filled in here.
    pub(crate) fn publish(&self, mut state: FeedState<R>) -> Arc<FeedState<R>> {
        let state = {
            let mut revision = lock(&self.inner.revision);
            *revision += 1;
            state.revision = *revision;
            state.feed = self.inner.feed.clone();
            state.published_at = Utc::now();
            let state = Arc::new(state);
            self.inner.sender.send_replace(Arc::clone(&state));
            state
        };

        let callbacks: Vec<Callback<R>> = lock(&self.inner.subscribers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(&state);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SensorReading;
    use std::sync::atomic::AtomicUsize;

    fn reading(source: ReadingSource) -> SensorReading {
        SensorReading {
            timestamp: Utc::now(),
            temperature: 23.0,
            humidity: 45.0,
            source,
        }
    }

    fn state(connection: ConnectionState) -> FeedState<SensorReading> {
        FeedState {
            connection,
            latest: Some(reading(ReadingSource::Live)),
            ..FeedState::initial("ignored")
        }
    }

    #[test]
    fn test_initial_state() {
        let publisher: FeedStatePublisher<SensorReading> = FeedStatePublisher::new("field_bus");
        let current = publisher.current();
        assert_eq!(current.revision, 0);
        assert_eq!(current.feed, "field_bus");
        assert_eq!(current.connection, ConnectionState::Disconnected);
        assert!(current.latest.is_none());
        assert!(!current.is_synthetic());
    }

    #[test]
    fn test_revision_is_strictly_increasing() {
        let publisher = FeedStatePublisher::new("field_bus");
        let mut last = publisher.current().revision;
        for _ in 0..10 {
            let published = publisher.publish(state(ConnectionState::Connected));
            assert!(published.revision > last);
            assert_eq!(published.feed, "field_bus");
            last = published.revision;
        }
        assert_eq!(publisher.current().revision, 10);
        assert_eq!(publisher.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn test_snapshots_are_not_affected_by_later_publishes() {
        let publisher = FeedStatePublisher::new("field_bus");
        publisher.publish(state(ConnectionState::Connected));
        let held = publisher.current();
        publisher.publish(state(ConnectionState::Degraded));
        assert_eq!(held.connection, ConnectionState::Connected);
        assert_eq!(publisher.current().connection, ConnectionState::Degraded);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let publisher = FeedStatePublisher::new("field_bus");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let id = publisher.subscribe(move |state: &FeedState<SensorReading>| {
            assert!(state.revision > 0);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        publisher.publish(state(ConnectionState::Connected));
        publisher.publish(state(ConnectionState::Connected));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(state(ConnectionState::Connected));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_read_publisher() {
        let publisher = FeedStatePublisher::new("field_bus");
        let reader = publisher.clone();
        let observed = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&observed);
        publisher.subscribe(move |_: &FeedState<SensorReading>| {
            sink.store(reader.current().revision, Ordering::SeqCst);
        });
        publisher.publish(state(ConnectionState::Connected));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_synthetic() {
        let publisher = FeedStatePublisher::new("field_bus");
        let published = publisher.publish(FeedState {
            latest: Some(reading(ReadingSource::Synthetic)),
            ..FeedState::initial("field_bus")
        });
        assert!(published.is_synthetic());
    }

    #[tokio::test]
    async fn test_watch_receives_publishes() {
        let publisher = FeedStatePublisher::new("host_metrics");
        let mut receiver = publisher.watch();

        let writer = publisher.clone();
        tokio::spawn(async move {
            writer.publish(state(ConnectionState::Degraded));
        });

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().connection, ConnectionState::Degraded);
        assert_eq!(receiver.borrow().revision, 1);
    }
}
