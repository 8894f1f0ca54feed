// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use insights_core::{codec, Clock, EventId, Payload, SystemClock, Timestamp};
use tokio::sync::Mutex;

use super::{EventStore, FailedFlushReport, Result, StoredEvent, TimestampFloor};
use crate::error::StoreError;

pub const DEFAULT_MEMORY_CAPACITY: usize = 50;

struct Row {
	id: EventId,
	encoded: String,
	timestamp: Timestamp,
	retry_count: u32,
}

/// Bounded, non-durable event store.
///
/// Rows are encoded exactly as the SQLite store encodes them, so the same
/// payload rules apply. Saves beyond the capacity fail with
/// [`StoreError::CapacityExceeded`].
pub struct MemoryEventStore {
	rows: Mutex<Vec<Row>>,
	capacity: usize,
	clock: Arc<dyn Clock>,
	floor: TimestampFloor,
}

impl MemoryEventStore {
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			rows: Mutex::new(Vec::new()),
			capacity,
			clock: Arc::new(SystemClock),
			floor: TimestampFloor::new(),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

impl Default for MemoryEventStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl EventStore for MemoryEventStore {
	async fn save_event(&self, payload: &Payload) -> Result<EventId> {
		let encoded = codec::encode(payload)?;
		let mut rows = self.rows.lock().await;
		if rows.len() >= self.capacity {
			return Err(StoreError::CapacityExceeded {
				capacity: self.capacity,
			});
		}

		let id = EventId::new();
		rows.push(Row {
			id: id.clone(),
			encoded,
			timestamp: self.floor.stamp(self.clock.now()),
			retry_count: 0,
		});
		Ok(id)
	}

	async fn get_all_events(&self, before: Timestamp) -> Result<Vec<StoredEvent>> {
		let rows = self.rows.lock().await;
		self.floor.raise_above(before);

		let events = rows
			.iter()
			.filter(|row| row.timestamp <= before)
			.filter_map(|row| match codec::decode(&row.encoded) {
				Ok(payload) => Some(StoredEvent {
					id: row.id.clone(),
					payload,
					timestamp: row.timestamp,
					retry_count: row.retry_count,
				}),
				Err(e) => {
					tracing::warn!(event_id = %row.id, error = %e, "skipping undecodable stored event");
					None
				}
			})
			.collect();
		Ok(events)
	}

	async fn get_event_count(&self) -> Result<u64> {
		Ok(self.rows.lock().await.len() as u64)
	}

	async fn delete_flushed_events(&self, before: Timestamp) -> Result<u64> {
		let mut rows = self.rows.lock().await;
		let len = rows.len();
		rows.retain(|row| row.timestamp > before);
		Ok((len - rows.len()) as u64)
	}

	async fn delete_old_events(&self, before: Timestamp) -> Result<u64> {
		let mut rows = self.rows.lock().await;
		let len = rows.len();
		rows.retain(|row| row.timestamp >= before);
		Ok((len - rows.len()) as u64)
	}

	async fn record_failed_flush(
		&self,
		before: Timestamp,
		max_retries: u32,
	) -> Result<FailedFlushReport> {
		let mut rows = self.rows.lock().await;
		let mut report = FailedFlushReport::default();
		rows.retain_mut(|row| {
			if row.timestamp > before {
				return true;
			}
			row.retry_count = row.retry_count.saturating_add(1);
			if row.retry_count >= max_retries {
				report.dropped += 1;
				false
			} else {
				report.retried += 1;
				true
			}
		});
		Ok(report)
	}
}
