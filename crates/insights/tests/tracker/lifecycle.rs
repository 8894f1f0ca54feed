// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use insights::{
	EventStore, FlushOutcome, MemoryEventStore, RetryConfig, SqliteEventStore, Tracker,
	TrackerOptions,
};
use insights_core::Clock;
use tempfile::TempDir;

use super::support::{click, eventually, manual_clock, ScriptedTransport};

const DAY: Duration = Duration::from_secs(86_400);

fn quiet() -> TrackerOptions {
	TrackerOptions {
		max_batch_size: 100,
		auto_flush_timer_interval: Duration::from_secs(3600),
		..TrackerOptions::default()
	}
}

#[tokio::test]
async fn stale_events_are_evicted_without_a_successful_flush() {
	let clock = manual_clock();
	let store = Arc::new(MemoryEventStore::new().with_clock(clock.clone()));
	let transport = ScriptedTransport::failing();
	let tracker = Tracker::builder()
		.options(TrackerOptions {
			cache_threshold_days: 7,
			..quiet()
		})
		.store(store.clone())
		.transport(transport.clone())
		.clock(clock.clone())
		.retry_config(RetryConfig::no_retry())
		.start()
		.await
		.unwrap();

	tracker.track_click(click("old"));
	assert_eq!(tracker.event_count().await.unwrap(), 1);

	clock.advance(8 * DAY);
	tracker.track_click(click("fresh"));
	assert_eq!(tracker.event_count().await.unwrap(), 2);

	let outcome = tracker.flush().await.unwrap();
	assert!(matches!(outcome, FlushOutcome::Failed { .. }));

	assert_eq!(tracker.event_count().await.unwrap(), 1);
	let remaining = store.get_all_events(clock.now()).await.unwrap();
	assert_eq!(remaining[0].payload.get_str("link"), Some("fresh"));
}

#[tokio::test]
async fn startup_evicts_stale_rows_left_by_previous_run() {
	let clock = manual_clock();
	let store = Arc::new(MemoryEventStore::new().with_clock(clock.clone()));
	store.save_event(&click("ancient")).await.unwrap();
	clock.advance(30 * DAY);

	let tracker = Tracker::builder()
		.options(quiet())
		.store(store.clone())
		.transport(ScriptedTransport::succeeding())
		.clock(clock)
		.start()
		.await
		.unwrap();

	assert_eq!(tracker.event_count().await.unwrap(), 0);
}

#[tokio::test]
async fn undelivered_events_are_sent_by_the_next_process() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("fpti-events.db");

	let first_session = {
		let store = SqliteEventStore::open(&path).await.unwrap();
		let tracker = Tracker::builder()
			.options(quiet())
			.store(Arc::new(store))
			.transport(ScriptedTransport::failing())
			.retry_config(RetryConfig::no_retry())
			.start()
			.await
			.unwrap();

		tracker.track_click(click("x"));
		tracker.track_click(click("y"));
		tracker.shutdown().await.unwrap();
		tracker.session_id().clone()
	};

	let transport = ScriptedTransport::succeeding();
	let store = SqliteEventStore::open(&path).await.unwrap();
	let tracker = Tracker::builder()
		.options(TrackerOptions {
			auto_flush_timer_interval: Duration::from_millis(100),
			..quiet()
		})
		.store(Arc::new(store))
		.transport(transport.clone())
		.start()
		.await
		.unwrap();

	assert_ne!(tracker.session_id(), &first_session);
	eventually("recovered events to be sent", || async {
		tracker.event_count().await.unwrap() == 0
	})
	.await;
	assert_eq!(transport.sent_links().await, vec![vec!["x", "y"]]);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_flush() {
	let transport = ScriptedTransport::gated();
	let store = Arc::new(MemoryEventStore::new());
	let tracker = Tracker::builder()
		.options(quiet())
		.store(store.clone())
		.transport(transport.clone())
		.start()
		.await
		.unwrap();

	tracker.track_click(click("x"));
	tracker.flush_data();
	eventually("flush to reach the transport", || async {
		transport.calls() == 1
	})
	.await;

	let shutdown = tokio::spawn({
		let tracker = tracker.clone();
		async move { tracker.shutdown().await }
	});
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(!shutdown.is_finished());

	transport.release();
	shutdown.await.unwrap().unwrap();

	assert_eq!(transport.calls(), 1);
	assert_eq!(store.get_event_count().await.unwrap(), 0);
}

#[tokio::test]
async fn tracking_after_shutdown_is_dropped() {
	let store = Arc::new(MemoryEventStore::new());
	let tracker = Tracker::builder()
		.options(quiet())
		.store(store.clone())
		.transport(ScriptedTransport::succeeding())
		.start()
		.await
		.unwrap();

	tracker.shutdown().await.unwrap();
	tracker.track_click(click("late"));
	tracker.flush_data();

	assert_eq!(store.get_event_count().await.unwrap(), 0);
	assert!(tracker.event_count().await.is_err());
}

#[tokio::test]
async fn flush_sends_readable_events_past_a_corrupt_row() {
	let dir = TempDir::new().unwrap();
	let options = sqlx::sqlite::SqliteConnectOptions::new()
		.filename(dir.path().join("events.db"))
		.create_if_missing(true);
	let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
	let clock = manual_clock();
	let store = SqliteEventStore::from_pool(pool.clone())
		.await
		.unwrap()
		.with_clock(clock.clone());

	let transport = ScriptedTransport::succeeding();
	let tracker = Tracker::builder()
		.options(quiet())
		.store(Arc::new(store))
		.transport(transport.clone())
		.clock(clock.clone())
		.retry_config(RetryConfig::no_retry())
		.start()
		.await
		.unwrap();

	tracker.track_click(click("a"));
	assert_eq!(tracker.event_count().await.unwrap(), 1);
	sqlx::query("INSERT INTO fpti_events (id, payload, timestamp) VALUES (?1, ?2, ?3)")
		.bind("corrupt")
		.bind("{not json")
		.bind(clock.now().as_millis())
		.execute(&pool)
		.await
		.unwrap();
	tracker.track_click(click("b"));

	assert_eq!(
		tracker.flush().await.unwrap(),
		FlushOutcome::Sent { events: 2 }
	);
	assert_eq!(transport.sent_links().await, vec![vec!["a", "b"]]);
	assert_eq!(tracker.event_count().await.unwrap(), 0);
}
