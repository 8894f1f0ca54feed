// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable storage for tracked events awaiting delivery.
//!
//! Every store stamps rows with the time they were saved. Deletion and
//! retry bookkeeping take a `before` timestamp and act on rows at or
//! before it, so the tracker can snapshot a batch with
//! [`EventStore::get_all_events`] and later remove exactly that batch
//! while new events keep arriving.

mod memory;
mod sqlite;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use insights_core::{EventId, Payload, Timestamp};

use crate::error::StoreError;

pub use memory::{MemoryEventStore, DEFAULT_MEMORY_CAPACITY};
pub use sqlite::SqliteEventStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// An event as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
	pub id: EventId,
	pub payload: Payload,
	pub timestamp: Timestamp,
	/// Failed flushes this event has already taken part in.
	pub retry_count: u32,
}

/// Result of [`EventStore::record_failed_flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailedFlushReport {
	/// Events kept for another attempt.
	pub retried: u64,
	/// Events removed because they reached the retry limit.
	pub dropped: u64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
	/// Persists one event, stamped with the store clock.
	async fn save_event(&self, payload: &Payload) -> Result<EventId>;

	/// Events stamped at or before `before`, in insertion order.
	///
	/// Rows that fail to decode are logged and skipped. Any event saved
	/// after this call is stamped strictly later than `before`.
	async fn get_all_events(&self, before: Timestamp) -> Result<Vec<StoredEvent>>;

	async fn get_event_count(&self) -> Result<u64>;

	/// Deletes events stamped at or before `before`. Returns the number
	/// removed; calling it again for the same cutoff removes nothing.
	async fn delete_flushed_events(&self, before: Timestamp) -> Result<u64>;

	/// Deletes events stamped strictly before `before`, delivered or not.
	async fn delete_old_events(&self, before: Timestamp) -> Result<u64>;

	/// Bumps the retry count of events at or before `before` and removes
	/// those that have now taken part in `max_retries` failed flushes.
	async fn record_failed_flush(&self, before: Timestamp, max_retries: u32)
		-> Result<FailedFlushReport>;
}

/// Monotonic floor for save timestamps.
///
/// Reading a snapshot raises the floor above its cutoff so rows saved
/// afterwards can never fall inside an in-flight batch, even when the
/// clock has not moved.
#[derive(Debug)]
pub(crate) struct TimestampFloor(AtomicI64);

impl TimestampFloor {
	pub(crate) fn new() -> Self {
		Self(AtomicI64::new(i64::MIN))
	}

	/// The timestamp to stamp a new row with.
	pub(crate) fn stamp(&self, now: Timestamp) -> Timestamp {
		let previous = self.0.fetch_max(now.as_millis(), Ordering::SeqCst);
		Timestamp::from_millis(previous.max(now.as_millis()))
	}

	pub(crate) fn raise_above(&self, cutoff: Timestamp) {
		self.0.fetch_max(cutoff.next().as_millis(), Ordering::SeqCst);
	}
}
