// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event tracker: public handle plus the background worker that owns
//! the store, the flush timer and the single-flight flush guard.
//!
//! Tracking calls are synchronous and never block on I/O. They enrich the
//! event on the caller's thread and enqueue it; the worker persists it and
//! decides when to flush.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use insights::{HttpFlushTransport, SqliteEventStore, Tracker};
//! use insights_core::{Payload, TrackerOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteEventStore::open("/tmp/fpti-events.db").await?;
//! let transport = HttpFlushTransport::new("https://collector.example.com/v1/track")?;
//!
//! let tracker = Tracker::builder()
//!     .options(TrackerOptions::default())
//!     .store(Arc::new(store))
//!     .transport(Arc::new(transport))
//!     .start()
//!     .await?;
//!
//! tracker.track_click(Payload::new().insert("link", "add-transfer-method"));
//! tracker.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod worker;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use insights_common_http::RetryConfig;
use insights_core::{
	tags, Clock, DeviceProfile, EventMetadata, EventType, Payload, SessionId, SystemClock,
	TrackerOptions,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::error::{Result, TrackerError};
use crate::store::EventStore;
use crate::transport::FlushTransport;
use worker::{Command, Worker};

/// How a flush request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
	/// The batch was delivered and removed from the store.
	Sent { events: usize },
	/// Nothing was stored at the snapshot time.
	Empty,
	/// Another flush was already in flight, or an automatic trigger fell
	/// inside the post-failure cooldown.
	Skipped,
	/// Delivery or the snapshot read failed; events remain stored.
	Failed { reason: String },
}

/// Observable state of the flush state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
	Idle,
	FlushInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushTrigger {
	Manual,
	BatchSize,
	Timer,
	Shutdown,
}

impl FlushTrigger {
	/// Automatic triggers respect the cooldown after a failed flush.
	pub(crate) fn is_automatic(self) -> bool {
		matches!(self, FlushTrigger::BatchSize | FlushTrigger::Timer)
	}
}

impl fmt::Display for FlushTrigger {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			FlushTrigger::Manual => "manual",
			FlushTrigger::BatchSize => "batch_size",
			FlushTrigger::Timer => "timer",
			FlushTrigger::Shutdown => "shutdown",
		};
		f.write_str(name)
	}
}

struct TrackerInner {
	commands: mpsc::UnboundedSender<Command>,
	session_id: SessionId,
	metadata: EventMetadata,
	clock: Arc<dyn Clock>,
	accepting: AtomicBool,
}

/// Handle to a running tracker. Cheap to clone; all clones feed the same
/// worker.
#[derive(Clone)]
pub struct Tracker {
	inner: Arc<TrackerInner>,
}

impl Tracker {
	pub fn builder() -> TrackerBuilder {
		TrackerBuilder::new()
	}

	/// Identifier shared by every event this tracker produces.
	pub fn session_id(&self) -> &SessionId {
		&self.inner.session_id
	}

	pub fn track_click(&self, params: Payload) {
		self.track(EventType::Click, params);
	}

	pub fn track_impression(&self, params: Payload) {
		self.track(EventType::Impression, params);
	}

	pub fn track_error(&self, params: Payload) {
		self.track(EventType::Error, params);
	}

	/// Enriches and enqueues one event. Returns immediately.
	pub fn track(&self, event_type: EventType, params: Payload) {
		if !self.inner.accepting.load(Ordering::Acquire) {
			warn!(%event_type, "tracker is shutting down, dropping event");
			return;
		}

		let payload = self.enrich(event_type, params);
		if self.inner.commands.send(Command::Track(payload)).is_err() {
			warn!(%event_type, "tracker worker has stopped, dropping event");
		}
	}

	/// Requests a flush without waiting for its outcome.
	pub fn flush_data(&self) {
		if self.inner.commands.send(Command::Flush { reply: None }).is_err() {
			warn!("tracker worker has stopped, ignoring flush request");
		}
	}

	/// Requests a flush and waits until it settles.
	pub async fn flush(&self) -> Result<FlushOutcome> {
		let (reply, rx) = oneshot::channel();
		self.inner
			.commands
			.send(Command::Flush { reply: Some(reply) })
			.map_err(|_| TrackerError::Shutdown)?;
		rx.await.map_err(|_| TrackerError::Shutdown)
	}

	/// Number of events currently held in the store.
	pub async fn event_count(&self) -> Result<u64> {
		let (reply, rx) = oneshot::channel();
		self.inner
			.commands
			.send(Command::EventCount { reply })
			.map_err(|_| TrackerError::Shutdown)?;
		Ok(rx.await.map_err(|_| TrackerError::Shutdown)??)
	}

	/// Current flush state, as seen after all previously enqueued commands
	/// have been processed.
	pub async fn state(&self) -> Result<TrackerState> {
		let (reply, rx) = oneshot::channel();
		self.inner
			.commands
			.send(Command::State { reply })
			.map_err(|_| TrackerError::Shutdown)?;
		rx.await.map_err(|_| TrackerError::Shutdown)
	}

	/// Stops intake, waits for any in-flight flush, makes a final flush
	/// attempt and stops the worker. Calling it again is a no-op.
	pub async fn shutdown(&self) -> Result<()> {
		self.inner.accepting.store(false, Ordering::Release);

		let (reply, rx) = oneshot::channel();
		if self.inner.commands.send(Command::Shutdown { reply }).is_err() {
			return Ok(());
		}
		let _ = rx.await;
		Ok(())
	}

	fn enrich(&self, event_type: EventType, params: Payload) -> Payload {
		let mut payload = params;
		payload.set(tags::SESSION_ID, self.inner.session_id.to_string());
		payload.extend_from(self.inner.metadata.attributes());
		payload.set(tags::EVENT_TYPE, event_type.tag_value());
		payload.set(tags::TIMESTAMP, self.inner.clock.now().as_millis());
		payload
	}
}

impl fmt::Debug for Tracker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tracker")
			.field("session_id", &self.inner.session_id)
			.field("accepting", &self.inner.accepting.load(Ordering::Relaxed))
			.finish()
	}
}

/// Assembles a [`Tracker`] from its store, transport and options.
pub struct TrackerBuilder {
	options: TrackerOptions,
	store: Option<Arc<dyn EventStore>>,
	transport: Option<Arc<dyn FlushTransport>>,
	clock: Arc<dyn Clock>,
	metadata: Option<EventMetadata>,
	retry: Option<RetryConfig>,
}

impl TrackerBuilder {
	pub fn new() -> Self {
		Self {
			options: TrackerOptions::default(),
			store: None,
			transport: None,
			clock: Arc::new(SystemClock),
			metadata: None,
			retry: None,
		}
	}

	pub fn options(mut self, options: TrackerOptions) -> Self {
		self.options = options;
		self
	}

	pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn transport(mut self, transport: Arc<dyn FlushTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Clock used for event timestamps, snapshot cutoffs and retention.
	/// Give the store the same clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Overrides detected device attributes.
	pub fn device_profile(mut self, profile: &DeviceProfile) -> Self {
		self.metadata = Some(EventMetadata::with_profile(profile));
		self
	}

	/// Replaces the metadata merged into every event.
	pub fn metadata(mut self, metadata: EventMetadata) -> Self {
		self.metadata = Some(metadata);
		self
	}

	/// Backoff between transport attempts within one flush. Defaults to
	/// `max_flush_attempts` attempts with exponential backoff.
	pub fn retry_config(mut self, retry: RetryConfig) -> Self {
		self.retry = Some(retry);
		self
	}

	/// Validates the options, recovers pending events and spawns the
	/// worker. Must be called from within a Tokio runtime.
	pub async fn start(self) -> Result<Tracker> {
		let options = self.options;
		options.validate()?;

		let store = self.store.ok_or(TrackerError::MissingComponent("store"))?;
		let transport = self
			.transport
			.ok_or(TrackerError::MissingComponent("transport"))?;
		let retry = self
			.retry
			.unwrap_or_else(|| RetryConfig::with_max_attempts(options.max_flush_attempts));
		let metadata = self
			.metadata
			.unwrap_or_else(|| EventMetadata::detected().clone());

		let session_id = SessionId::new();
		let (commands, rx) = mpsc::unbounded_channel();

		let mut worker = Worker::new(options, store, transport, self.clock.clone(), retry, rx);
		let pending = worker.recover().await?;
		tokio::spawn(worker.run());

		info!(session_id = %session_id, pending, "tracker started");

		Ok(Tracker {
			inner: Arc::new(TrackerInner {
				commands,
				session_id,
				metadata,
				clock: self.clock,
				accepting: AtomicBool::new(true),
			}),
		})
	}
}

impl Default for TrackerBuilder {
	fn default() -> Self {
		Self::new()
	}
}
