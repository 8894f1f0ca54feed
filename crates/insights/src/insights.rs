// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Page-level tracking API for UI hosts.

use std::path::PathBuf;
use std::sync::Arc;

use insights_core::tags::{self, values};
use insights_core::{DeviceProfile, EventMetadata, Payload, TrackerOptions};

use crate::error::{Result, StoreError, TrackerError};
use crate::store::SqliteEventStore;
use crate::tracker::Tracker;
use crate::transport::HttpFlushTransport;

/// Location of the event database when none is configured.
pub fn default_database_path() -> Option<PathBuf> {
	dirs::data_dir().map(|dir| dir.join("insights").join("fpti-events.db"))
}

/// Category reported in `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	Api,
	Form,
	Connection,
	Exception,
}

impl ErrorKind {
	pub fn tag_value(self) -> &'static str {
		match self {
			ErrorKind::Api => values::ERROR_TYPE_API,
			ErrorKind::Form => values::ERROR_TYPE_FORM,
			ErrorKind::Connection => values::ERROR_TYPE_CONNECTION,
			ErrorKind::Exception => values::ERROR_TYPE_EXCEPTION,
		}
	}
}

/// Details of an error shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
	pub kind: ErrorKind,
	pub code: Option<String>,
	pub message: Option<String>,
	/// Form field the error is attached to, if any.
	pub field_name: Option<String>,
	pub description: Option<String>,
}

impl ErrorInfo {
	pub fn new(kind: ErrorKind) -> Self {
		Self {
			kind,
			code: None,
			message: None,
			field_name: None,
			description: None,
		}
	}

	/// A connection error with the `TIMEOUT` code.
	pub fn connection_timeout(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Connection)
			.with_code(values::ERROR_CODE_CONNECTION)
			.with_message(message)
	}

	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into());
		self
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
		self.field_name = Some(field_name.into());
		self
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	fn to_params(&self) -> Payload {
		let mut params = Payload::new().insert(tags::ERROR_TYPE, self.kind.tag_value());
		let optional = [
			(tags::ERROR_CODE, &self.code),
			(tags::ERROR_MESSAGE, &self.message),
			(tags::ERROR_FIELD_NAME, &self.field_name),
			(tags::ERROR_DESCRIPTION, &self.description),
		];
		for (key, value) in optional {
			if let Some(value) = value {
				params.set(key, value.as_str());
			}
		}
		params
	}
}

/// Settings for [`Insights::setup`].
#[derive(Debug, Clone)]
pub struct InsightsConfig {
	/// Collector endpoint batches are posted to.
	pub api_url: String,
	/// Reported as `tracking_visitor_id` when present.
	pub user_token: Option<String>,
	pub sdk_version: Option<String>,
	/// Defaults to [`default_database_path`].
	pub database_path: Option<PathBuf>,
	pub device_profile: DeviceProfile,
	pub options: TrackerOptions,
}

impl InsightsConfig {
	pub fn new(api_url: impl Into<String>) -> Self {
		Self {
			api_url: api_url.into(),
			user_token: None,
			sdk_version: None,
			database_path: None,
			device_profile: DeviceProfile::default(),
			options: TrackerOptions::default(),
		}
	}

	pub fn with_user_token(mut self, user_token: impl Into<String>) -> Self {
		self.user_token = Some(user_token.into());
		self
	}

	pub fn with_sdk_version(mut self, sdk_version: impl Into<String>) -> Self {
		self.sdk_version = Some(sdk_version.into());
		self
	}

	pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.database_path = Some(path.into());
		self
	}

	pub fn with_device_profile(mut self, profile: DeviceProfile) -> Self {
		self.device_profile = profile;
		self
	}

	pub fn with_options(mut self, options: TrackerOptions) -> Self {
		self.options = options;
		self
	}

	fn resolve_database_path(&self) -> std::result::Result<PathBuf, StoreError> {
		self.database_path
			.clone()
			.or_else(default_database_path)
			.ok_or_else(|| StoreError::InvalidLocation("no data directory available".to_string()))
	}
}

/// Tracks page views, clicks and errors on behalf of a UI.
///
/// Wraps a [`Tracker`] and adds the page name, page group and visit
/// identifiers to every event.
#[derive(Debug, Clone)]
pub struct Insights {
	tracker: Tracker,
	user_token: Option<String>,
}

impl Insights {
	/// Opens the event database, builds the HTTP transport and starts the
	/// tracker.
	#[tracing::instrument(skip(config), fields(api_url = %config.api_url))]
	pub async fn setup(config: InsightsConfig) -> Result<Self> {
		let path = config
			.resolve_database_path()
			.map_err(TrackerError::StoreInit)?;
		let store = SqliteEventStore::open(&path)
			.await
			.map_err(TrackerError::StoreInit)?;
		let transport = HttpFlushTransport::new(&config.api_url)?;

		let mut metadata = EventMetadata::with_profile(&config.device_profile);
		if let Some(sdk_version) = &config.sdk_version {
			metadata = metadata.with_sdk_version(sdk_version.as_str());
		}

		let tracker = Tracker::builder()
			.options(config.options)
			.store(Arc::new(store))
			.transport(Arc::new(transport))
			.metadata(metadata)
			.start()
			.await?;

		tracing::info!(database = %path.display(), "insights ready");
		Ok(Self::new(tracker, config.user_token))
	}

	pub fn new(tracker: Tracker, user_token: Option<String>) -> Self {
		Self {
			tracker,
			user_token,
		}
	}

	pub fn tracker(&self) -> &Tracker {
		&self.tracker
	}

	/// Tracks a click on `link`, e.g. `select-transfer-method`.
	pub fn track_click(&self, page_name: &str, page_group: &str, link: &str, params: Payload) {
		let params = self.page_params(page_name, page_group, params).insert(tags::LINK, link);
		self.tracker.track_click(params);
	}

	pub fn track_impression(&self, page_name: &str, page_group: &str, params: Payload) {
		let params = self.page_params(page_name, page_group, params);
		self.tracker.track_impression(params);
	}

	pub fn track_error(&self, page_name: &str, page_group: &str, error: &ErrorInfo) {
		let params = self.page_params(page_name, page_group, error.to_params());
		self.tracker.track_error(params);
	}

	pub async fn shutdown(&self) -> Result<()> {
		self.tracker.shutdown().await
	}

	fn page_params(&self, page_name: &str, page_group: &str, params: Payload) -> Payload {
		let mut params = params
			.insert(tags::PAGE_NAME, page_name)
			.insert(tags::PAGE_GROUP, page_group)
			.insert(tags::TRACKING_VISIT_ID, self.tracker.session_id().to_string());
		if let Some(user_token) = &self.user_token {
			params.set(tags::TRACKING_VISITOR_ID, user_token.as_str());
		}
		params
	}
}
