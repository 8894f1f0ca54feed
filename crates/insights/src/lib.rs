// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side FPTI analytics tracking.
//!
//! Events are enriched with session and device attributes, written to a
//! local [`EventStore`] and delivered in batches through a
//! [`FlushTransport`]. Delivery is triggered when the stored count reaches
//! `max_batch_size`, on a periodic timer, or on request. At most one flush
//! is in flight at a time, and a failed flush leaves its events stored for
//! the next attempt.
//!
//! [`Insights`] is the page-level entry point for UI code; [`Tracker`] is
//! the lower-level handle it wraps.

pub mod error;
mod insights;
pub mod store;
pub mod tracker;
pub mod transport;

pub use error::{StoreError, TrackerError, TransportError};
pub use insights::{default_database_path, ErrorInfo, ErrorKind, Insights, InsightsConfig};
pub use store::{
	EventStore, FailedFlushReport, MemoryEventStore, SqliteEventStore, StoredEvent,
	DEFAULT_MEMORY_CAPACITY,
};
pub use tracker::{FlushOutcome, Tracker, TrackerBuilder, TrackerState};
pub use transport::{FlushTransport, HttpFlushTransport};

pub use insights_common_http::RetryConfig;
pub use insights_core::{
	DeviceProfile, DeviceType, EventType, Payload, TrackerOptions, TrackerOptionsLayer,
};
