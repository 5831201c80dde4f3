// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bounded, time-ordered history retention
//!
//! This module provides the fixed-capacity FIFO ring used to keep the last
//! readings of a feed for trend charts and monitoring tables:
//!
//! - [`HistoryBuffer`]: fixed capacity, evicts the oldest item on insert
//! - [`SampledHistory`]: a `HistoryBuffer` that only retains readings spaced
//!   at least a given interval apart (hourly chart, ten-minute table)
//!
//! Items must expose their timestamp through [`Timestamped`]; the buffer
//! refuses items older than the newest one it retains so that snapshots are
//! always in non-decreasing time order.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use thiserror::Error;

/// Anything that carries an acquisition timestamp
pub trait Timestamped {
    /// Acquisition time of the item
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Errors raised when inserting into a [`HistoryBuffer`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// The item is older than the newest retained item
    #[error("item at {item} is older than the newest retained item at {newest}")]
    OutOfOrder {
        item: DateTime<Utc>,
        newest: DateTime<Utc>,
    },
}

/// Fixed-capacity FIFO ring keyed by arrival order
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, TimeZone, Utc};
/// use rust_labmonitor::utility::history_buffer::{HistoryBuffer, Timestamped};
///
/// #[derive(Clone)]
/// struct Sample(DateTime<Utc>);
/// impl Timestamped for Sample {
///     fn timestamp(&self) -> DateTime<Utc> {
///         self.0
///     }
/// }
///
/// let mut buffer = HistoryBuffer::new(2);
/// for minute in 0..3 {
///     let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap();
///     buffer.push(Sample(at)).unwrap();
/// }
/// assert_eq!(buffer.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Timestamped + Clone> HistoryBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest one when the buffer is full
    ///
    /// Returns the evicted item, if any. Items older than the newest retained
    /// item are rejected and the buffer is left untouched.
    pub fn push(&mut self, item: T) -> Result<Option<T>, HistoryError> {
        if let Some(newest) = self.items.back() {
            if item.timestamp() < newest.timestamp() {
                return Err(HistoryError::OutOfOrder {
                    item: item.timestamp(),
                    newest: newest.timestamp(),
                });
            }
        }

        if self.capacity == 0 {
            return Ok(Some(item));
        }

        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        Ok(evicted)
    }

    /// Ordered copy of the retained items, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Newest retained item
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Change the capacity, keeping the newest items
    pub fn resize(&mut self, capacity: usize) {
        while self.items.len() > capacity {
            self.items.pop_front();
        }
        self.capacity = capacity;
    }
}

impl<T> HistoryBuffer<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A history buffer fed at a coarser cadence than the poll interval
///
/// Every successful reading is offered; it is retained only when at least
/// `spacing` has elapsed since the newest retained item. A zero spacing keeps
/// every reading.
#[derive(Debug, Clone)]
pub struct SampledHistory<T> {
    buffer: HistoryBuffer<T>,
    spacing: Duration,
}

impl<T: Timestamped + Clone> SampledHistory<T> {
    pub fn new(capacity: usize, spacing: Duration) -> Self {
        Self {
            buffer: HistoryBuffer::new(capacity),
            spacing,
        }
    }

    /// Offer a reading, returning `Ok(true)` when it was retained
    ///
    /// `Ok(false)` means the reading came too soon after the newest retained
    /// one. A reading older than the newest retained one is an error.
    pub fn offer(&mut self, item: T) -> Result<bool, HistoryError> {
        if let Some(newest) = self.buffer.latest() {
            let elapsed = item.timestamp() - newest.timestamp();
            if elapsed < Duration::zero() {
                return Err(HistoryError::OutOfOrder {
                    item: item.timestamp(),
                    newest: newest.timestamp(),
                });
            }
            if elapsed < self.spacing {
                return Ok(false);
            }
        }
        self.buffer.push(item).map(|_| true)
    }

    /// Apply a new capacity and spacing, keeping the newest items
    pub fn reconfigure(&mut self, capacity: usize, spacing: Duration) {
        self.buffer.resize(capacity);
        self.spacing = spacing;
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.buffer.snapshot()
    }

    pub fn buffer(&self) -> &HistoryBuffer<T> {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        at: DateTime<Utc>,
        value: u32,
    }

    impl Timestamped for Sample {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn sample(minutes: i64, value: u32) -> Sample {
        Sample {
            at: t0() + Duration::minutes(minutes),
            value,
        }
    }

    #[test]
    fn test_keeps_last_capacity_items_in_push_order() {
        let mut buffer = HistoryBuffer::new(5);
        for i in 0..23 {
            buffer.push(sample(i, i as u32)).unwrap();
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(buffer.capacity(), 5);
        let values: Vec<u32> = snapshot.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![18, 19, 20, 21, 22]);
    }

    #[test]
    fn test_ten_minute_table_keeps_t3_to_t14() {
        let mut buffer = HistoryBuffer::new(12);
        for i in 0..15 {
            buffer.push(sample(i * 10, i as u32)).unwrap();
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 12);
        assert_eq!(snapshot.first().unwrap().at, t0() + Duration::minutes(30));
        assert_eq!(snapshot.last().unwrap().at, t0() + Duration::minutes(140));
        assert!(snapshot.windows(2).all(|w| w[0].at < w[1].at));
    }

    #[test]
    fn test_push_returns_evicted_item() {
        let mut buffer = HistoryBuffer::new(2);
        assert_eq!(buffer.push(sample(0, 0)).unwrap(), None);
        assert_eq!(buffer.push(sample(1, 1)).unwrap(), None);
        assert_eq!(buffer.push(sample(2, 2)).unwrap(), Some(sample(0, 0)));
    }

    #[test]
    fn test_out_of_order_item_is_rejected() {
        let mut buffer = HistoryBuffer::new(4);
        buffer.push(sample(10, 1)).unwrap();

        let result = buffer.push(sample(5, 2));
        assert!(matches!(result, Err(HistoryError::OutOfOrder { .. })));
        assert_eq!(buffer.len(), 1);

        // Equal timestamps keep the ordering non-decreasing
        buffer.push(sample(10, 3)).unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_resize_keeps_newest_items() {
        let mut buffer = HistoryBuffer::new(6);
        for i in 0..6 {
            buffer.push(sample(i, i as u32)).unwrap();
        }

        buffer.resize(3);
        let values: Vec<u32> = buffer.snapshot().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3, 4, 5]);
        assert_eq!(buffer.capacity(), 3);
    }

    #[test]
    fn test_sampled_history_respects_spacing() {
        let mut history = SampledHistory::new(24, Duration::minutes(60));

        // One reading every 10 minutes for 3 hours
        let retained: Vec<bool> = (0..19)
            .map(|i| history.offer(sample(i * 10, i as u32)).unwrap())
            .collect();

        assert_eq!(retained.iter().filter(|r| **r).count(), 4);
        let minutes: Vec<i64> = history
            .snapshot()
            .iter()
            .map(|s| (s.at - t0()).num_minutes())
            .collect();
        assert_eq!(minutes, vec![0, 60, 120, 180]);
    }

    #[test]
    fn test_sampled_history_zero_spacing_keeps_everything() {
        let mut history = SampledHistory::new(3, Duration::zero());
        for i in 0..5 {
            assert!(history.offer(sample(i, i as u32)).unwrap());
        }
        assert_eq!(history.buffer().len(), 3);
    }

    #[test]
    fn test_sampled_history_reports_clock_step_back() {
        let mut history = SampledHistory::new(4, Duration::minutes(10));
        assert_eq!(history.offer(sample(30, 0)), Ok(true));
        assert_eq!(history.offer(sample(35, 1)), Ok(false));
        assert_eq!(
            history.offer(sample(20, 2)),
            Err(HistoryError::OutOfOrder {
                item: t0() + Duration::minutes(20),
                newest: t0() + Duration::minutes(30),
            })
        );
        assert_eq!(history.snapshot(), vec![sample(30, 0)]);
    }
}
