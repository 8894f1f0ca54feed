// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of event batches to the FPTI collector.

use async_trait::async_trait;
use insights_core::Payload;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::error::TransportError;

/// Sends one batch of enriched events.
///
/// The tracker bounds every call with its own timeout, so implementations
/// need not enforce one. A returned error leaves the batch in the store
/// for a later flush.
#[async_trait]
pub trait FlushTransport: Send + Sync {
	async fn send(&self, batch: &[Payload]) -> Result<(), TransportError>;
}

#[derive(Serialize)]
struct BatchBody<'a> {
	events: Vec<EventEnvelope<'a>>,
}

#[derive(Serialize)]
struct EventEnvelope<'a> {
	event_params: &'a Payload,
}

impl<'a> BatchBody<'a> {
	fn new(batch: &'a [Payload]) -> Self {
		Self {
			events: batch
				.iter()
				.map(|event_params| EventEnvelope { event_params })
				.collect(),
		}
	}
}

/// Posts batches as JSON to a collector endpoint.
///
/// The body has the shape `{"events":[{"event_params":{...}}, ...]}`.
/// Any 2xx response counts as delivered.
#[derive(Debug, Clone)]
pub struct HttpFlushTransport {
	endpoint: Url,
	http: Client,
}

impl HttpFlushTransport {
	pub fn new(endpoint: &str) -> Result<Self, TransportError> {
		let http = insights_common_http::builder().build()?;
		Self::with_client(endpoint, http)
	}

	pub fn with_client(endpoint: &str, http: Client) -> Result<Self, TransportError> {
		let endpoint = Url::parse(endpoint)
			.map_err(|e| TransportError::InvalidUrl(format!("{endpoint}: {e}")))?;
		Ok(Self { endpoint, http })
	}

	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}
}

#[async_trait]
impl FlushTransport for HttpFlushTransport {
	#[tracing::instrument(skip(self, batch), fields(endpoint = %self.endpoint, events = batch.len()))]
	async fn send(&self, batch: &[Payload]) -> Result<(), TransportError> {
		let response = self
			.http
			.post(self.endpoint.clone())
			.json(&BatchBody::new(batch))
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			tracing::debug!(status = status.as_u16(), "batch accepted");
			return Ok(());
		}

		let message = response.text().await.unwrap_or_default();
		tracing::warn!(status = status.as_u16(), message = %message, "collector rejected batch");
		Err(TransportError::Server {
			status: status.as_u16(),
			message,
		})
	}
}
