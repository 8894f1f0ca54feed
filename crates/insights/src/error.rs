// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the tracker runtime.

use std::time::Duration;

use insights_common_http::RetryableError;
use insights_core::{CodecError, ConfigError};
use thiserror::Error;

/// A read or write against the event store failed.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] CodecError),

	#[error("event store capacity of {capacity} events exceeded")]
	CapacityExceeded { capacity: usize },

	#[error("invalid store location: {0}")]
	InvalidLocation(String),
}

/// Delivering a batch to the collector failed.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("HTTP request failed: {0}")]
	Network(#[from] reqwest::Error),

	#[error("collector returned {status}: {message}")]
	Server { status: u16, message: String },

	#[error("no response within {0:?}")]
	Timeout(Duration),

	#[error("invalid collector URL: {0}")]
	InvalidUrl(String),

	#[error("dispatch task aborted: {0}")]
	Aborted(String),
}

impl RetryableError for TransportError {
	fn is_retryable(&self) -> bool {
		match self {
			TransportError::Network(e) => e.is_retryable(),
			TransportError::Server { status, .. } => {
				matches!(*status, 429 | 408 | 500 | 502 | 503 | 504)
			}
			TransportError::Timeout(_) => true,
			TransportError::InvalidUrl(_) | TransportError::Aborted(_) => false,
		}
	}
}

/// Errors surfaced by the tracker handle.
#[derive(Debug, Error)]
pub enum TrackerError {
	/// The store could not be opened; the tracker cannot start.
	#[error("failed to initialise event store: {0}")]
	StoreInit(#[source] StoreError),

	#[error("event store error: {0}")]
	Store(#[from] StoreError),

	#[error("invalid tracker options: {0}")]
	Config(#[from] ConfigError),

	#[error("transport setup failed: {0}")]
	Transport(#[from] TransportError),

	#[error("tracker builder is missing a {0}")]
	MissingComponent(&'static str),

	#[error("tracker has been shut down")]
	Shutdown,
}

pub type Result<T> = std::result::Result<T, TrackerError>;
