// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff for collector deliveries.

use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

/// Backoff policy applied by [`retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total number of attempts, including the first one.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// Default backoff with a different attempt budget. Zero is treated as one.
	pub fn with_max_attempts(max_attempts: u32) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			..Self::default()
		}
	}

	/// A single attempt, no backoff.
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			base_delay: Duration::ZERO,
			max_delay: Duration::ZERO,
			backoff_factor: 1.0,
			jitter: false,
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Status codes worth another attempt.
const RETRYABLE_STATUSES: [StatusCode; 6] = [
	StatusCode::TOO_MANY_REQUESTS,
	StatusCode::REQUEST_TIMEOUT,
	StatusCode::INTERNAL_SERVER_ERROR,
	StatusCode::BAD_GATEWAY,
	StatusCode::SERVICE_UNAVAILABLE,
	StatusCode::GATEWAY_TIMEOUT,
];

impl RetryableError for StatusCode {
	fn is_retryable(&self) -> bool {
		RETRYABLE_STATUSES.contains(self)
	}
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}

		self.status().map(|s| s.is_retryable()).unwrap_or(false)
	}
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential_delay = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped_delay = exponential_delay.min(cfg.max_delay.as_secs_f64());

	let final_delay = if cfg.jitter {
		capped_delay * (0.5 + fastrand::f64())
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}

/// Runs `f` until it succeeds, returns a non-retryable error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let max_attempts = cfg.max_attempts.max(1);
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(error = %err, attempt, "non-retryable delivery error");
					return Err(err);
				}

				if attempt >= max_attempts {
					warn!(
						error = %err,
						attempt,
						max_attempts,
						"delivery attempts exhausted"
					);
					return Err(err);
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
					error = %err,
					attempt,
					max_attempts,
					delay_ms = delay.as_millis() as u64,
					"retrying delivery after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}
