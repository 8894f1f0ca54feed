// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use insights_common_http::{retry, RetryConfig};
use insights_core::{Clock, Payload, Timestamp, TrackerOptions};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{FlushOutcome, FlushTrigger, TrackerState};
use crate::error::{StoreError, TrackerError, TransportError};
use crate::store::EventStore;
use crate::transport::FlushTransport;

pub(crate) enum Command {
	Track(Payload),
	Flush {
		reply: Option<oneshot::Sender<FlushOutcome>>,
	},
	EventCount {
		reply: oneshot::Sender<Result<u64, StoreError>>,
	},
	State {
		reply: oneshot::Sender<TrackerState>,
	},
	Shutdown {
		reply: oneshot::Sender<()>,
	},
}

struct FlushCompletion {
	result: Result<(), TransportError>,
}

struct InFlight {
	cutoff: Timestamp,
	events: usize,
	reply: Option<oneshot::Sender<FlushOutcome>>,
}

enum Wakeup {
	Command(Option<Command>),
	Completed(FlushCompletion),
	Tick,
}

/// Serial owner of the store, the flush timer and the in-flight guard.
///
/// Transport calls run on a separate task so tracking keeps flowing while
/// a batch is on the wire; their result comes back over `done_rx`.
pub(crate) struct Worker {
	options: TrackerOptions,
	store: Arc<dyn EventStore>,
	transport: Arc<dyn FlushTransport>,
	clock: Arc<dyn Clock>,
	retry: RetryConfig,
	commands: mpsc::UnboundedReceiver<Command>,
	done_tx: mpsc::UnboundedSender<FlushCompletion>,
	done_rx: mpsc::UnboundedReceiver<FlushCompletion>,
	in_flight: Option<InFlight>,
	last_cutoff: Option<Timestamp>,
	timer: Option<Interval>,
	cooldown_until: Option<Instant>,
	shutdown_waiters: Vec<oneshot::Sender<()>>,
	final_flush_started: bool,
}

impl Worker {
	pub(crate) fn new(
		options: TrackerOptions,
		store: Arc<dyn EventStore>,
		transport: Arc<dyn FlushTransport>,
		clock: Arc<dyn Clock>,
		retry: RetryConfig,
		commands: mpsc::UnboundedReceiver<Command>,
	) -> Self {
		let (done_tx, done_rx) = mpsc::unbounded_channel();
		Self {
			options,
			store,
			transport,
			clock,
			retry,
			commands,
			done_tx,
			done_rx,
			in_flight: None,
			last_cutoff: None,
			timer: None,
			cooldown_until: None,
			shutdown_waiters: Vec::new(),
			final_flush_started: false,
		}
	}

	/// Evicts stale rows left by earlier runs and arms the timer if any
	/// events are still waiting. Returns the pending count.
	pub(crate) async fn recover(&mut self) -> Result<u64, TrackerError> {
		self.evict_stale().await;

		let pending = self
			.store
			.get_event_count()
			.await
			.map_err(TrackerError::StoreInit)?;
		if pending > 0 {
			debug!(pending, "found undelivered events from a previous run");
			self.arm_timer();
		}
		Ok(pending)
	}

	pub(crate) async fn run(mut self) {
		loop {
			let wakeup = tokio::select! {
				command = self.commands.recv() => Wakeup::Command(command),
				Some(done) = self.done_rx.recv() => Wakeup::Completed(done),
				_ = next_tick(&mut self.timer) => Wakeup::Tick,
			};

			match wakeup {
				Wakeup::Command(Some(command)) => self.handle(command).await,
				Wakeup::Command(None) => {
					debug!("all tracker handles dropped, stopping worker");
					break;
				}
				Wakeup::Completed(done) => self.complete_flush(done).await,
				Wakeup::Tick => self.start_flush(FlushTrigger::Timer, None).await,
			}

			if self.shutdown_ready() {
				break;
			}
		}

		for waiter in self.shutdown_waiters.drain(..) {
			let _ = waiter.send(());
		}
		info!("tracker stopped");
	}

	async fn handle(&mut self, command: Command) {
		match command {
			Command::Track(payload) => self.track(payload).await,
			Command::Flush { reply } => self.start_flush(FlushTrigger::Manual, reply).await,
			Command::EventCount { reply } => {
				let _ = reply.send(self.store.get_event_count().await);
			}
			Command::State { reply } => {
				let _ = reply.send(self.state());
			}
			Command::Shutdown { reply } => {
				self.shutdown_waiters.push(reply);
				if !self.final_flush_started && self.in_flight.is_none() {
					self.final_flush_started = true;
					self.start_flush(FlushTrigger::Shutdown, None).await;
				}
			}
		}
	}

	fn state(&self) -> TrackerState {
		if self.in_flight.is_some() {
			TrackerState::FlushInProgress
		} else {
			TrackerState::Idle
		}
	}

	fn shutting_down(&self) -> bool {
		!self.shutdown_waiters.is_empty()
	}

	/// Once the final flush has settled the worker can exit. A shutdown that
	/// arrived mid-flush gets its final flush here.
	fn shutdown_ready(&self) -> bool {
		self.shutting_down() && self.final_flush_started && self.in_flight.is_none()
	}

	async fn track(&mut self, payload: Payload) {
		if self.shutting_down() {
			warn!("tracker is shutting down, dropping event");
			return;
		}

		match self.store.save_event(&payload).await {
			Ok(id) => debug!(event_id = %id, "event saved"),
			Err(e) => {
				warn!(error = %e, "failed to save event, dropping it");
				return;
			}
		}

		match self.store.get_event_count().await {
			Ok(count) if count >= self.options.max_batch_size as u64 => {
				debug!(count, max_batch_size = self.options.max_batch_size, "batch size reached");
				self.start_flush(FlushTrigger::BatchSize, None).await;
			}
			Ok(_) => {}
			Err(e) => warn!(error = %e, "failed to count stored events"),
		}

		self.arm_timer();
	}

	fn arm_timer(&mut self) {
		if self.timer.is_some() {
			return;
		}
		let period = self.options.auto_flush_timer_interval;
		let mut timer = interval_at(Instant::now() + period, period);
		timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
		self.timer = Some(timer);
	}

	fn in_cooldown(&self) -> bool {
		self.cooldown_until
			.is_some_and(|until| Instant::now() < until)
	}

	async fn start_flush(
		&mut self,
		trigger: FlushTrigger,
		reply: Option<oneshot::Sender<FlushOutcome>>,
	) {
		if self.in_flight.is_some() {
			debug!(%trigger, "flush already in progress, skipping");
			respond(reply, FlushOutcome::Skipped);
			return;
		}
		if trigger.is_automatic() && self.in_cooldown() {
			debug!(%trigger, "in cooldown after a failed flush, skipping");
			respond(reply, FlushOutcome::Skipped);
			return;
		}

		let cutoff = self.next_cutoff();
		let batch = match self.store.get_all_events(cutoff).await {
			Ok(batch) => batch,
			Err(e) => {
				warn!(error = %e, "failed to read stored events, skipping this flush");
				respond(
					reply,
					FlushOutcome::Failed {
						reason: e.to_string(),
					},
				);
				return;
			}
		};

		if batch.is_empty() {
			debug!(%trigger, "nothing to flush");
			self.timer = None;
			respond(reply, FlushOutcome::Empty);
			return;
		}

		let payloads: Vec<Payload> = batch.into_iter().map(|event| event.payload).collect();
		let events = payloads.len();
		info!(%trigger, events, %cutoff, "flushing events");

		self.in_flight = Some(InFlight {
			cutoff,
			events,
			reply,
		});
		self.spawn_dispatch(payloads);
	}

	/// Snapshot cutoffs strictly increase. Events saved after a snapshot are
	/// stamped past its cutoff, so the next cutoff must reach them even if
	/// the clock has not advanced.
	fn next_cutoff(&mut self) -> Timestamp {
		let now = self.clock.now();
		let cutoff = match self.last_cutoff {
			Some(last) => now.max(last.next()),
			None => now,
		};
		self.last_cutoff = Some(cutoff);
		cutoff
	}

	fn spawn_dispatch(&self, payloads: Vec<Payload>) {
		let transport = self.transport.clone();
		let retry = self.retry.clone();
		let timeout = self.options.network_dispatch_timeout;
		let done_tx = self.done_tx.clone();

		tokio::spawn(async move {
			let handle =
				tokio::spawn(async move { dispatch(transport, payloads, retry, timeout).await });
			let result = match handle.await {
				Ok(result) => result,
				Err(e) => Err(TransportError::Aborted(e.to_string())),
			};
			let _ = done_tx.send(FlushCompletion { result });
		});
	}

	async fn complete_flush(&mut self, done: FlushCompletion) {
		let Some(in_flight) = self.in_flight.take() else {
			return;
		};

		let mut batch_ready = false;
		let outcome = match done.result {
			Ok(()) => {
				match self.store.delete_flushed_events(in_flight.cutoff).await {
					Ok(deleted) => info!(events = in_flight.events, deleted, "flush completed"),
					Err(e) => {
						error!(error = %e, "batch delivered but could not be removed from the store")
					}
				}
				self.cooldown_until = None;
				batch_ready = self.settle_timer().await;
				FlushOutcome::Sent {
					events: in_flight.events,
				}
			}
			Err(e) => {
				warn!(error = %e, events = in_flight.events, "flush failed, keeping events");
				match self
					.store
					.record_failed_flush(
						in_flight.cutoff,
						self.options.retry_counts_for_event_dispatch,
					)
					.await
				{
					Ok(report) if report.dropped > 0 => warn!(
						dropped = report.dropped,
						retried = report.retried,
						"dropped events that exhausted their dispatch retries"
					),
					Ok(_) => {}
					Err(e) => warn!(error = %e, "failed to record flush failure"),
				}

				let buffer = self.options.buffer_time_to_wait_before_flush;
				if !buffer.is_zero() {
					self.cooldown_until = Some(Instant::now() + buffer);
				}
				self.arm_timer();
				FlushOutcome::Failed {
					reason: e.to_string(),
				}
			}
		};

		respond(in_flight.reply, outcome);
		self.evict_stale().await;

		if self.shutting_down() {
			if !self.final_flush_started {
				self.final_flush_started = true;
				self.start_flush(FlushTrigger::Shutdown, None).await;
			}
		} else if batch_ready {
			self.start_flush(FlushTrigger::BatchSize, None).await;
		}
	}

	/// Events tracked while a batch was on the wire outlive its delete. Keeps
	/// the timer running for them and reports whether they already fill a
	/// batch.
	async fn settle_timer(&mut self) -> bool {
		match self.store.get_event_count().await {
			Ok(0) => {
				self.timer = None;
				false
			}
			Ok(remaining) => {
				debug!(remaining, "events left after flush");
				self.arm_timer();
				remaining >= self.options.max_batch_size as u64
			}
			Err(e) => {
				warn!(error = %e, "failed to count stored events");
				self.arm_timer();
				false
			}
		}
	}

	async fn evict_stale(&self) {
		let threshold = self.clock.now().saturating_sub(self.options.retention());
		match self.store.delete_old_events(threshold).await {
			Ok(0) => {}
			Ok(evicted) => info!(evicted, %threshold, "evicted stale events"),
			Err(e) => warn!(error = %e, "failed to evict stale events"),
		}
	}
}

fn respond(reply: Option<oneshot::Sender<FlushOutcome>>, outcome: FlushOutcome) {
	if let Some(reply) = reply {
		let _ = reply.send(outcome);
	}
}

async fn next_tick(timer: &mut Option<Interval>) {
	match timer {
		Some(timer) => {
			timer.tick().await;
		}
		None => std::future::pending().await,
	}
}

/// Sends one batch, retrying transient failures and bounding each attempt
/// by `timeout`.
async fn dispatch(
	transport: Arc<dyn FlushTransport>,
	payloads: Vec<Payload>,
	retry_config: RetryConfig,
	timeout: Duration,
) -> Result<(), TransportError> {
	let transport = transport.as_ref();
	let batch = payloads.as_slice();
	retry(&retry_config, || async move {
		match tokio::time::timeout(timeout, transport.send(batch)).await {
			Ok(result) => result,
			Err(_) => Err(TransportError::Timeout(timeout)),
		}
	})
	.await
}
