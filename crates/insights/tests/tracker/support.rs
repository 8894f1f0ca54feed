// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use insights::{FlushTransport, Payload, TransportError};
use insights_core::{ManualClock, Timestamp};
use tokio::sync::{Mutex, Semaphore};

/// Transport whose behaviour tests can flip at runtime.
#[derive(Default)]
pub struct ScriptedTransport {
	pub calls: AtomicUsize,
	pub should_fail: AtomicBool,
	pub batches: Mutex<Vec<Vec<Payload>>>,
	gate: Option<Semaphore>,
}

impl ScriptedTransport {
	pub fn succeeding() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn failing() -> Arc<Self> {
		let transport = Self::default();
		transport.should_fail.store(true, Ordering::SeqCst);
		Arc::new(transport)
	}

	/// Every send blocks until [`ScriptedTransport::release`] is called.
	pub fn gated() -> Arc<Self> {
		Arc::new(Self {
			gate: Some(Semaphore::new(0)),
			..Self::default()
		})
	}

	pub fn release(&self) {
		if let Some(gate) = &self.gate {
			gate.add_permits(1);
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn set_failing(&self, failing: bool) {
		self.should_fail.store(failing, Ordering::SeqCst);
	}

	pub async fn sent_links(&self) -> Vec<Vec<String>> {
		self.batches
			.lock()
			.await
			.iter()
			.map(|batch| {
				batch
					.iter()
					.filter_map(|event| event.get_str("link").map(str::to_string))
					.collect()
			})
			.collect()
	}
}

#[async_trait]
impl FlushTransport for ScriptedTransport {
	async fn send(&self, batch: &[Payload]) -> Result<(), TransportError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if let Some(gate) = &self.gate {
			gate.acquire().await.expect("gate closed").forget();
		}
		if self.should_fail.load(Ordering::SeqCst) {
			return Err(TransportError::Server {
				status: 503,
				message: "scripted failure".to_string(),
			});
		}
		self.batches.lock().await.push(batch.to_vec());
		Ok(())
	}
}

pub fn click(link: &str) -> Payload {
	Payload::new().insert("link", link)
}

pub fn manual_clock() -> Arc<ManualClock> {
	Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)))
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut condition: F)
where
	F: FnMut() -> Fut,
	Fut: Future<Output = bool>,
{
	let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
	while !condition().await {
		assert!(
			tokio::time::Instant::now() < deadline,
			"timed out waiting for {what}"
		);
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}
