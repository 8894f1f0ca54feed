// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracker options.
//!
//! [`TrackerOptions`] is the resolved runtime form handed to the tracker
//! at construction; it never changes afterwards. [`TrackerOptionsLayer`]
//! is the partial form read from a config source, merged in precedence
//! order and then finalized.

pub mod sources;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

const DEFAULT_AUTO_FLUSH_TIMER_INTERVAL_SECS: u64 = 10;
const DEFAULT_MAX_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_FLUSH_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_COUNTS_FOR_EVENT_DISPATCH: u32 = 3;
const DEFAULT_NETWORK_DISPATCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BUFFER_TIME_TO_WAIT_BEFORE_FLUSH_MS: u64 = 0;
const DEFAULT_KEEP_SESSION_ALIVE_INTERVAL_SECS: u64 = 1800;
const DEFAULT_CACHE_THRESHOLD_DAYS: u32 = 7;

const SECS_PER_DAY: u64 = 86_400;

/// Tracker options (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerOptions {
	/// Period of the automatic flush timer.
	pub auto_flush_timer_interval: Duration,
	/// Stored event count that triggers an immediate flush.
	pub max_batch_size: usize,
	/// Transport attempts made within a single flush.
	pub max_flush_attempts: u32,
	/// Failed flushes an event may take part in before it is dropped.
	pub retry_counts_for_event_dispatch: u32,
	/// Upper bound on a single transport attempt.
	pub network_dispatch_timeout: Duration,
	/// Quiet period after a failed flush during which automatic triggers
	/// are ignored.
	pub buffer_time_to_wait_before_flush: Duration,
	/// Reserved. Loaded and validated, but sessions are never rotated.
	pub keep_session_alive_interval: Duration,
	/// Events older than this many days are evicted whether or not they
	/// were ever delivered.
	pub cache_threshold_days: u32,
}

impl Default for TrackerOptions {
	fn default() -> Self {
		Self {
			auto_flush_timer_interval: Duration::from_secs(DEFAULT_AUTO_FLUSH_TIMER_INTERVAL_SECS),
			max_batch_size: DEFAULT_MAX_BATCH_SIZE,
			max_flush_attempts: DEFAULT_MAX_FLUSH_ATTEMPTS,
			retry_counts_for_event_dispatch: DEFAULT_RETRY_COUNTS_FOR_EVENT_DISPATCH,
			network_dispatch_timeout: Duration::from_secs(DEFAULT_NETWORK_DISPATCH_TIMEOUT_SECS),
			buffer_time_to_wait_before_flush: Duration::from_millis(
				DEFAULT_BUFFER_TIME_TO_WAIT_BEFORE_FLUSH_MS,
			),
			keep_session_alive_interval: Duration::from_secs(DEFAULT_KEEP_SESSION_ALIVE_INTERVAL_SECS),
			cache_threshold_days: DEFAULT_CACHE_THRESHOLD_DAYS,
		}
	}
}

impl TrackerOptions {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_batch_size < 1 {
			return Err(ConfigError::invalid_value("max_batch_size", "must be at least 1"));
		}
		if self.auto_flush_timer_interval.is_zero() {
			return Err(ConfigError::invalid_value(
				"auto_flush_timer_interval",
				"must be greater than zero",
			));
		}
		if self.max_flush_attempts < 1 {
			return Err(ConfigError::invalid_value("max_flush_attempts", "must be at least 1"));
		}
		if self.retry_counts_for_event_dispatch < 1 {
			return Err(ConfigError::invalid_value(
				"retry_counts_for_event_dispatch",
				"must be at least 1",
			));
		}
		if self.network_dispatch_timeout.is_zero() {
			return Err(ConfigError::invalid_value(
				"network_dispatch_timeout",
				"must be greater than zero",
			));
		}
		if self.cache_threshold_days < 1 {
			return Err(ConfigError::invalid_value("cache_threshold_days", "must be at least 1"));
		}
		Ok(())
	}

	/// The retention window as a duration.
	pub fn retention(&self) -> Duration {
		Duration::from_secs(u64::from(self.cache_threshold_days) * SECS_PER_DAY)
	}
}

/// Tracker options layer (partial, for merging).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerOptionsLayer {
	pub auto_flush_timer_interval_secs: Option<u64>,
	pub max_batch_size: Option<usize>,
	pub max_flush_attempts: Option<u32>,
	pub retry_counts_for_event_dispatch: Option<u32>,
	pub network_dispatch_timeout_secs: Option<u64>,
	pub buffer_time_to_wait_before_flush_ms: Option<u64>,
	pub keep_session_alive_interval_secs: Option<u64>,
	pub cache_threshold_days: Option<u32>,
}

impl TrackerOptionsLayer {
	/// Overlays `other` onto this layer; fields set in `other` win.
	pub fn merge(&mut self, other: TrackerOptionsLayer) {
		if other.auto_flush_timer_interval_secs.is_some() {
			self.auto_flush_timer_interval_secs = other.auto_flush_timer_interval_secs;
		}
		if other.max_batch_size.is_some() {
			self.max_batch_size = other.max_batch_size;
		}
		if other.max_flush_attempts.is_some() {
			self.max_flush_attempts = other.max_flush_attempts;
		}
		if other.retry_counts_for_event_dispatch.is_some() {
			self.retry_counts_for_event_dispatch = other.retry_counts_for_event_dispatch;
		}
		if other.network_dispatch_timeout_secs.is_some() {
			self.network_dispatch_timeout_secs = other.network_dispatch_timeout_secs;
		}
		if other.buffer_time_to_wait_before_flush_ms.is_some() {
			self.buffer_time_to_wait_before_flush_ms = other.buffer_time_to_wait_before_flush_ms;
		}
		if other.keep_session_alive_interval_secs.is_some() {
			self.keep_session_alive_interval_secs = other.keep_session_alive_interval_secs;
		}
		if other.cache_threshold_days.is_some() {
			self.cache_threshold_days = other.cache_threshold_days;
		}
	}

	/// Fills unset fields with defaults and validates the result.
	pub fn finalize(self) -> Result<TrackerOptions, ConfigError> {
		let options = TrackerOptions {
			auto_flush_timer_interval: Duration::from_secs(
				self
					.auto_flush_timer_interval_secs
					.unwrap_or(DEFAULT_AUTO_FLUSH_TIMER_INTERVAL_SECS),
			),
			max_batch_size: self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
			max_flush_attempts: self.max_flush_attempts.unwrap_or(DEFAULT_MAX_FLUSH_ATTEMPTS),
			retry_counts_for_event_dispatch: self
				.retry_counts_for_event_dispatch
				.unwrap_or(DEFAULT_RETRY_COUNTS_FOR_EVENT_DISPATCH),
			network_dispatch_timeout: Duration::from_secs(
				self
					.network_dispatch_timeout_secs
					.unwrap_or(DEFAULT_NETWORK_DISPATCH_TIMEOUT_SECS),
			),
			buffer_time_to_wait_before_flush: Duration::from_millis(
				self
					.buffer_time_to_wait_before_flush_ms
					.unwrap_or(DEFAULT_BUFFER_TIME_TO_WAIT_BEFORE_FLUSH_MS),
			),
			keep_session_alive_interval: Duration::from_secs(
				self
					.keep_session_alive_interval_secs
					.unwrap_or(DEFAULT_KEEP_SESSION_ALIVE_INTERVAL_SECS),
			),
			cache_threshold_days: self
				.cache_threshold_days
				.unwrap_or(DEFAULT_CACHE_THRESHOLD_DAYS),
		};

		options.validate()?;
		Ok(options)
	}
}

/// Resolves options from sources, lowest precedence first.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<TrackerOptions, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut layer = TrackerOptionsLayer::default();
	for source in &sources {
		tracing::debug!(source = source.name(), "loading tracker options layer");
		layer.merge(source.load()?);
	}

	layer.finalize()
}

/// Resolves options from defaults, an optional TOML file and the
/// `INSIGHTS_TRACKER_*` environment variables, in that order.
pub fn load_options(path: Option<&Path>) -> Result<TrackerOptions, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
	if let Some(path) = path {
		sources.push(Box::new(TomlSource::new(path)));
	}
	sources.push(Box::new(EnvSource::process()));

	load_from_sources(sources)
}
