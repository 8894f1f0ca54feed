// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use insights::{
	EventStore, FlushOutcome, MemoryEventStore, RetryConfig, Tracker, TrackerOptions,
	TrackerState,
};
use insights_core::ManualClock;

use super::support::{click, eventually, manual_clock, ScriptedTransport};

fn options(max_batch_size: usize) -> TrackerOptions {
	TrackerOptions {
		max_batch_size,
		auto_flush_timer_interval: Duration::from_secs(3600),
		..TrackerOptions::default()
	}
}

async fn start(
	options: TrackerOptions,
	transport: Arc<ScriptedTransport>,
	clock: Arc<ManualClock>,
) -> (Tracker, Arc<MemoryEventStore>) {
	let store = Arc::new(MemoryEventStore::new().with_clock(clock.clone()));
	let tracker = Tracker::builder()
		.options(options)
		.store(store.clone())
		.transport(transport)
		.clock(clock)
		.retry_config(RetryConfig::no_retry())
		.start()
		.await
		.unwrap();
	(tracker, store)
}

async fn wait_idle(tracker: &Tracker) {
	eventually("tracker to go idle", || async {
		tracker.state().await.unwrap() == TrackerState::Idle
	})
	.await;
}

#[tokio::test]
async fn second_click_triggers_flush_that_empties_store() {
	let transport = ScriptedTransport::succeeding();
	let (tracker, _store) = start(options(2), transport.clone(), manual_clock()).await;

	tracker.track_click(click("x"));
	assert_eq!(tracker.event_count().await.unwrap(), 1);
	assert_eq!(transport.calls(), 0);

	tracker.track_click(click("y"));
	eventually("store to drain", || async {
		tracker.event_count().await.unwrap() == 0
	})
	.await;

	assert_eq!(transport.calls(), 1);
	assert_eq!(transport.sent_links().await, vec![vec!["x", "y"]]);
}

#[tokio::test]
async fn failed_flush_keeps_events_and_clears_guard() {
	let transport = ScriptedTransport::failing();
	let (tracker, _store) = start(options(2), transport.clone(), manual_clock()).await;

	tracker.track_click(click("x"));
	tracker.track_click(click("y"));
	eventually("triggered flush to fail", || async { transport.calls() == 1 }).await;
	wait_idle(&tracker).await;

	assert_eq!(tracker.event_count().await.unwrap(), 2);

	let outcome = tracker.flush().await.unwrap();
	assert!(matches!(outcome, FlushOutcome::Failed { .. }), "got {outcome:?}");
	assert_eq!(transport.calls(), 2);
	assert_eq!(tracker.event_count().await.unwrap(), 2);
}

#[tokio::test]
async fn failure_does_not_change_event_count() {
	let transport = ScriptedTransport::failing();
	let (tracker, store) = start(options(100), transport.clone(), manual_clock()).await;

	for link in ["a", "b", "c"] {
		tracker.track_click(click(link));
	}
	let before = tracker.event_count().await.unwrap();

	tracker.flush().await.unwrap();

	assert_eq!(tracker.event_count().await.unwrap(), before);
	assert_eq!(store.get_event_count().await.unwrap(), before);
}

#[tokio::test]
async fn concurrent_flush_is_skipped() {
	let transport = ScriptedTransport::gated();
	let (tracker, _store) = start(options(100), transport.clone(), manual_clock()).await;

	tracker.track_click(click("x"));

	let first = tokio::spawn({
		let tracker = tracker.clone();
		async move { tracker.flush().await }
	});
	eventually("first flush to reach the transport", || async {
		transport.calls() == 1
	})
	.await;
	assert_eq!(tracker.state().await.unwrap(), TrackerState::FlushInProgress);

	assert_eq!(tracker.flush().await.unwrap(), FlushOutcome::Skipped);
	tracker.flush_data();

	transport.release();
	assert_eq!(
		first.await.unwrap().unwrap(),
		FlushOutcome::Sent { events: 1 }
	);
	assert_eq!(transport.calls(), 1);
	assert_eq!(tracker.event_count().await.unwrap(), 0);
}

#[tokio::test]
async fn event_tracked_mid_flush_goes_out_next_time() {
	let transport = ScriptedTransport::gated();
	let clock = manual_clock();
	let (tracker, _store) = start(options(100), transport.clone(), clock).await;

	tracker.track_click(click("before"));
	let first = tokio::spawn({
		let tracker = tracker.clone();
		async move { tracker.flush().await }
	});
	eventually("flush to reach the transport", || async {
		transport.calls() == 1
	})
	.await;

	// The clock has not moved, so this shares the snapshot's millisecond.
	tracker.track_click(click("during"));
	transport.release();

	assert_eq!(
		first.await.unwrap().unwrap(),
		FlushOutcome::Sent { events: 1 }
	);
	assert_eq!(tracker.event_count().await.unwrap(), 1);

	transport.release();
	assert_eq!(
		tracker.flush().await.unwrap(),
		FlushOutcome::Sent { events: 1 }
	);
	assert_eq!(
		transport.sent_links().await,
		vec![vec!["before"], vec!["during"]]
	);
}

#[tokio::test]
async fn timer_keeps_running_for_events_tracked_mid_flush() {
	let transport = ScriptedTransport::gated();
	let options = TrackerOptions {
		max_batch_size: 100,
		auto_flush_timer_interval: Duration::from_millis(100),
		..TrackerOptions::default()
	};
	let (tracker, _store) = start(options, transport.clone(), manual_clock()).await;

	tracker.track_click(click("a"));
	tracker.flush_data();
	eventually("flush to reach the transport", || async {
		transport.calls() == 1
	})
	.await;

	tracker.track_click(click("b"));
	tracker.track_click(click("c"));
	transport.release();
	transport.release();

	eventually("leftover events to be sent by the timer", || async {
		tracker.event_count().await.unwrap() == 0
	})
	.await;
	assert_eq!(transport.sent_links().await, vec![vec!["a"], vec!["b", "c"]]);
}

#[tokio::test]
async fn full_batch_tracked_mid_flush_is_sent_right_after() {
	let transport = ScriptedTransport::gated();
	let (tracker, _store) = start(options(2), transport.clone(), manual_clock()).await;

	tracker.track_click(click("a"));
	tracker.track_click(click("b"));
	eventually("batch to reach the transport", || async {
		transport.calls() == 1
	})
	.await;

	tracker.track_click(click("c"));
	tracker.track_click(click("d"));
	assert_eq!(tracker.event_count().await.unwrap(), 4);
	transport.release();
	transport.release();

	eventually("second batch to be sent", || async {
		tracker.event_count().await.unwrap() == 0
	})
	.await;
	wait_idle(&tracker).await;
	assert_eq!(transport.calls(), 2);
	assert_eq!(
		transport.sent_links().await,
		vec![vec!["a", "b"], vec!["c", "d"]]
	);
}

#[tokio::test]
async fn batch_trigger_fires_exactly_once() {
	let transport = ScriptedTransport::succeeding();
	let (tracker, _store) = start(options(3), transport.clone(), manual_clock()).await;

	tracker.track_click(click("1"));
	tracker.track_click(click("2"));
	assert_eq!(tracker.event_count().await.unwrap(), 2);
	assert_eq!(transport.calls(), 0);

	tracker.track_click(click("3"));
	eventually("batch to be sent", || async {
		tracker.event_count().await.unwrap() == 0
	})
	.await;
	wait_idle(&tracker).await;

	assert_eq!(transport.calls(), 1);
	assert_eq!(transport.sent_links().await, vec![vec!["1", "2", "3"]]);
}

#[tokio::test]
async fn timer_flushes_pending_events() {
	let transport = ScriptedTransport::succeeding();
	let options = TrackerOptions {
		max_batch_size: 100,
		auto_flush_timer_interval: Duration::from_millis(100),
		..TrackerOptions::default()
	};
	let (tracker, _store) = start(options, transport.clone(), manual_clock()).await;

	tracker.track_click(click("x"));
	eventually("timer flush", || async {
		tracker.event_count().await.unwrap() == 0
	})
	.await;
	assert_eq!(transport.sent_links().await, vec![vec!["x"]]);
}

#[tokio::test]
async fn cooldown_suppresses_automatic_triggers_only() {
	let transport = ScriptedTransport::failing();
	let options = TrackerOptions {
		max_batch_size: 1,
		auto_flush_timer_interval: Duration::from_secs(3600),
		buffer_time_to_wait_before_flush: Duration::from_secs(3600),
		..TrackerOptions::default()
	};
	let (tracker, _store) = start(options, transport.clone(), manual_clock()).await;

	tracker.track_click(click("x"));
	eventually("triggered flush to fail", || async { transport.calls() == 1 }).await;
	wait_idle(&tracker).await;

	transport.set_failing(false);
	tracker.track_click(click("y"));
	assert_eq!(tracker.event_count().await.unwrap(), 2);
	assert_eq!(transport.calls(), 1);

	assert_eq!(
		tracker.flush().await.unwrap(),
		FlushOutcome::Sent { events: 2 }
	);
	assert_eq!(tracker.event_count().await.unwrap(), 0);
}

#[tokio::test]
async fn events_dropped_after_exhausting_dispatch_retries() {
	let transport = ScriptedTransport::failing();
	let options = TrackerOptions {
		retry_counts_for_event_dispatch: 2,
		..options(100)
	};
	let (tracker, _store) = start(options, transport.clone(), manual_clock()).await;

	tracker.track_click(click("x"));
	tracker.flush().await.unwrap();
	assert_eq!(tracker.event_count().await.unwrap(), 1);

	tracker.flush().await.unwrap();
	assert_eq!(tracker.event_count().await.unwrap(), 0);
}
