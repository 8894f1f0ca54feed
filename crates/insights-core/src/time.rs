// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event timestamps and the clock they are read from.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
	pub const fn from_millis(millis: i64) -> Self {
		Self(millis)
	}

	pub const fn as_millis(self) -> i64 {
		self.0
	}

	/// The timestamp `duration` earlier, saturating at `i64::MIN`.
	pub fn saturating_sub(self, duration: Duration) -> Self {
		let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
		Self(self.0.saturating_sub(millis))
	}

	pub fn saturating_add(self, duration: Duration) -> Self {
		let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
		Self(self.0.saturating_add(millis))
	}

	/// The smallest timestamp strictly after this one.
	pub fn next(self) -> Self {
		Self(self.0.saturating_add(1))
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Source of wall-clock time for stores and the tracker.
pub trait Clock: Send + Sync {
	fn now(&self) -> Timestamp;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		Timestamp(chrono::Utc::now().timestamp_millis())
	}
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
	millis: AtomicI64,
}

impl ManualClock {
	pub fn new(start: Timestamp) -> Self {
		Self {
			millis: AtomicI64::new(start.as_millis()),
		}
	}

	pub fn set(&self, to: Timestamp) {
		self.millis.store(to.as_millis(), Ordering::SeqCst);
	}

	pub fn advance(&self, by: Duration) {
		let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
		self.millis.fetch_add(millis, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Timestamp {
		Timestamp(self.millis.load(Ordering::SeqCst))
	}
}
