// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use insights_core::{codec, Clock, EventId, Payload, SystemClock, Timestamp};
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;

use super::{EventStore, FailedFlushReport, Result, StoredEvent, TimestampFloor};
use crate::error::StoreError;

const CREATE_EVENTS_TABLE: &str = r#"
	CREATE TABLE IF NOT EXISTS fpti_events (
		seq INTEGER PRIMARY KEY AUTOINCREMENT,
		id TEXT NOT NULL UNIQUE,
		payload TEXT NOT NULL,
		timestamp INTEGER NOT NULL,
		retry_count INTEGER NOT NULL DEFAULT 0
	)
"#;

const CREATE_TIMESTAMP_INDEX: &str =
	"CREATE INDEX IF NOT EXISTS idx_fpti_events_timestamp ON fpti_events(timestamp)";

/// Event store backed by a single-file SQLite database.
///
/// Events survive process restarts. The pool holds one connection so
/// statements against the file are serialized.
pub struct SqliteEventStore {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
	floor: TimestampFloor,
}

impl SqliteEventStore {
	/// Opens (or creates) the database at `path`, creating parent
	/// directories as needed.
	#[tracing::instrument(skip_all)]
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent)?;
		}

		let options = SqliteConnectOptions::new().filename(path);
		Self::connect_with(options).await
	}

	/// Connects using a SQLite URL such as `sqlite:./events.db`.
	#[tracing::instrument(skip(database_url))]
	pub async fn connect(database_url: &str) -> Result<Self> {
		let options = SqliteConnectOptions::from_str(database_url)
			.map_err(|e| StoreError::InvalidLocation(format!("invalid database URL: {e}")))?;
		Self::connect_with(options).await
	}

	async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
		let options = options
			.journal_mode(SqliteJournalMode::Wal)
			.synchronous(SqliteSynchronous::Normal)
			.create_if_missing(true);

		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.idle_timeout(None)
			.max_lifetime(None)
			.connect_with(options)
			.await?;

		Self::from_pool(pool).await
	}

	/// Wraps an existing pool, creating the events table if it is missing.
	pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
		sqlx::query(CREATE_EVENTS_TABLE).execute(&pool).await?;
		sqlx::query(CREATE_TIMESTAMP_INDEX).execute(&pool).await?;
		tracing::debug!("event store ready");

		Ok(Self {
			pool,
			clock: Arc::new(SystemClock),
			floor: TimestampFloor::new(),
		})
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub async fn close(&self) {
		self.pool.close().await;
	}
}

#[async_trait]
impl EventStore for SqliteEventStore {
	#[tracing::instrument(skip(self, payload))]
	async fn save_event(&self, payload: &Payload) -> Result<EventId> {
		let encoded = codec::encode(payload)?;
		let id = EventId::new();
		let timestamp = self.floor.stamp(self.clock.now());

		sqlx::query("INSERT INTO fpti_events (id, payload, timestamp) VALUES (?1, ?2, ?3)")
			.bind(id.to_string())
			.bind(&encoded)
			.bind(timestamp.as_millis())
			.execute(&self.pool)
			.await?;

		tracing::trace!(event_id = %id, %timestamp, "event stored");
		Ok(id)
	}

	#[tracing::instrument(skip(self))]
	async fn get_all_events(&self, before: Timestamp) -> Result<Vec<StoredEvent>> {
		self.floor.raise_above(before);

		let rows = sqlx::query(
			r#"
			SELECT id, payload, timestamp, retry_count
			FROM fpti_events
			WHERE timestamp <= ?1
			ORDER BY seq ASC
			"#,
		)
		.bind(before.as_millis())
		.fetch_all(&self.pool)
		.await?;

		let mut events = Vec::with_capacity(rows.len());
		for row in rows {
			let raw_id: String = row.get("id");
			let id = match raw_id.parse::<EventId>() {
				Ok(id) => id,
				Err(e) => {
					tracing::warn!(id = %raw_id, error = %e, "skipping stored event with invalid id");
					continue;
				}
			};
			let text: String = row.get("payload");
			let payload = match codec::decode(&text) {
				Ok(payload) => payload,
				Err(e) => {
					tracing::warn!(event_id = %id, error = %e, "skipping undecodable stored event");
					continue;
				}
			};
			let retry_count: i64 = row.get("retry_count");
			events.push(StoredEvent {
				id,
				payload,
				timestamp: Timestamp::from_millis(row.get("timestamp")),
				retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
			});
		}

		Ok(events)
	}

	async fn get_event_count(&self) -> Result<u64> {
		let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM fpti_events")
			.fetch_one(&self.pool)
			.await?;
		Ok(row.0.max(0) as u64)
	}

	#[tracing::instrument(skip(self))]
	async fn delete_flushed_events(&self, before: Timestamp) -> Result<u64> {
		let result = sqlx::query("DELETE FROM fpti_events WHERE timestamp <= ?1")
			.bind(before.as_millis())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	async fn delete_old_events(&self, before: Timestamp) -> Result<u64> {
		let result = sqlx::query("DELETE FROM fpti_events WHERE timestamp < ?1")
			.bind(before.as_millis())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	async fn record_failed_flush(
		&self,
		before: Timestamp,
		max_retries: u32,
	) -> Result<FailedFlushReport> {
		let mut tx = self.pool.begin().await?;

		let bumped =
			sqlx::query("UPDATE fpti_events SET retry_count = retry_count + 1 WHERE timestamp <= ?1")
				.bind(before.as_millis())
				.execute(&mut *tx)
				.await?
				.rows_affected();

		let dropped =
			sqlx::query("DELETE FROM fpti_events WHERE timestamp <= ?1 AND retry_count >= ?2")
				.bind(before.as_millis())
				.bind(i64::from(max_retries))
				.execute(&mut *tx)
				.await?
				.rows_affected();

		tx.commit().await?;

		Ok(FailedFlushReport {
			retried: bumped.saturating_sub(dropped),
			dropped,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use insights_core::ManualClock;
	use std::time::Duration;
	use tempfile::TempDir;

	async fn open_store(dir: &TempDir, clock: Arc<ManualClock>) -> SqliteEventStore {
		SqliteEventStore::open(dir.path().join("events.db"))
			.await
			.unwrap()
			.with_clock(clock)
	}

	fn event(n: i64) -> Payload {
		Payload::new().insert("e", "cl").insert("n", n)
	}

	#[tokio::test]
	async fn test_save_and_read_in_insertion_order() {
		let dir = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
		let store = open_store(&dir, clock.clone()).await;

		for n in 0..3 {
			store.save_event(&event(n)).await.unwrap();
		}

		let events = store.get_all_events(clock.now()).await.unwrap();
		let order: Vec<i64> = events
			.iter()
			.map(|e| e.payload.get("n").and_then(|v| v.as_i64()).unwrap())
			.collect();
		assert_eq!(order, vec![0, 1, 2]);
		assert!(events.iter().all(|e| e.retry_count == 0));
		assert_eq!(store.get_event_count().await.unwrap(), 3);
	}

	#[tokio::test]
	async fn test_rejects_nested_values() {
		let dir = TempDir::new().unwrap();
		let store = open_store(&dir, Arc::new(ManualClock::new(Timestamp::from_millis(0)))).await;

		let payload = Payload::new().insert("nested", serde_json::json!({"a": 1}));
		let err = store.save_event(&payload).await.unwrap_err();
		assert!(matches!(err, StoreError::Serialization(_)));
		assert_eq!(store.get_event_count().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_unreadable_rows_are_skipped() {
		let dir = TempDir::new().unwrap();
		let options = SqliteConnectOptions::new()
			.filename(dir.path().join("events.db"))
			.create_if_missing(true);
		let pool = SqlitePool::connect_with(options).await.unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
		let store = SqliteEventStore::from_pool(pool.clone())
			.await
			.unwrap()
			.with_clock(clock.clone());

		store.save_event(&event(1)).await.unwrap();
		for (id, payload) in [
			(EventId::new().to_string(), "{not json"),
			("not-an-id".to_string(), r#"{"n":9}"#),
		] {
			sqlx::query("INSERT INTO fpti_events (id, payload, timestamp) VALUES (?1, ?2, ?3)")
				.bind(id)
				.bind(payload)
				.bind(clock.now().as_millis())
				.execute(&pool)
				.await
				.unwrap();
		}
		store.save_event(&event(2)).await.unwrap();

		let events = store.get_all_events(clock.now()).await.unwrap();
		let order: Vec<i64> = events
			.iter()
			.map(|e| e.payload.get("n").and_then(|v| v.as_i64()).unwrap())
			.collect();
		assert_eq!(order, vec![1, 2]);
		assert_eq!(store.get_event_count().await.unwrap(), 4);
	}

	#[tokio::test]
	async fn test_events_survive_reopen() {
		let dir = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(5_000)));
		{
			let store = open_store(&dir, clock.clone()).await;
			store.save_event(&event(1)).await.unwrap();
			store.save_event(&event(2)).await.unwrap();
			store.close().await;
		}

		let store = open_store(&dir, clock.clone()).await;
		assert_eq!(store.get_event_count().await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_snapshot_excludes_later_saves() {
		let dir = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(10_000)));
		let store = open_store(&dir, clock.clone()).await;

		store.save_event(&event(1)).await.unwrap();
		let cutoff = clock.now();
		let batch = store.get_all_events(cutoff).await.unwrap();
		assert_eq!(batch.len(), 1);

		// Same clock reading as the cutoff.
		store.save_event(&event(2)).await.unwrap();

		assert_eq!(store.delete_flushed_events(cutoff).await.unwrap(), 1);
		let remaining = store.get_all_events(clock.now().next()).await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].payload.get("n").and_then(|v| v.as_i64()), Some(2));
	}

	#[tokio::test]
	async fn test_delete_flushed_is_idempotent() {
		let dir = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(10_000)));
		let store = open_store(&dir, clock.clone()).await;

		store.save_event(&event(1)).await.unwrap();
		let cutoff = clock.now();
		assert_eq!(store.delete_flushed_events(cutoff).await.unwrap(), 1);
		assert_eq!(store.delete_flushed_events(cutoff).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_delete_old_events() {
		let dir = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(0)));
		let store = open_store(&dir, clock.clone()).await;

		store.save_event(&event(1)).await.unwrap();
		clock.advance(Duration::from_secs(8 * 86_400));
		store.save_event(&event(2)).await.unwrap();

		let cutoff = clock.now().saturating_sub(Duration::from_secs(7 * 86_400));
		assert_eq!(store.delete_old_events(cutoff).await.unwrap(), 1);
		assert_eq!(store.get_event_count().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_record_failed_flush_drops_at_limit() {
		let dir = TempDir::new().unwrap();
		let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
		let store = open_store(&dir, clock.clone()).await;

		store.save_event(&event(1)).await.unwrap();
		let first = clock.now();

		let report = store.record_failed_flush(first, 2).await.unwrap();
		assert_eq!(report, FailedFlushReport { retried: 1, dropped: 0 });

		clock.advance(Duration::from_secs(1));
		store.save_event(&event(2)).await.unwrap();

		let report = store.record_failed_flush(clock.now(), 2).await.unwrap();
		assert_eq!(report, FailedFlushReport { retried: 1, dropped: 1 });

		let remaining = store.get_all_events(clock.now()).await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].retry_count, 1);
	}
}
