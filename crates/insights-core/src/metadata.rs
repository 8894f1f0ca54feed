// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device and SDK attributes merged into every outgoing event.
//!
//! Runtime attributes are detected once per process and memoized. Hosts
//! that know more about the device (a UI shell knows its screen size and
//! form factor) pass a [`DeviceProfile`] whose fields override detection.
//! Anything that cannot be resolved is left out rather than guessed.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;
use crate::tags::{self, values};

/// Version of this SDK, reported under `sdk_version`.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

static DETECTED: OnceLock<EventMetadata> = OnceLock::new();

/// Device form factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
	Phone,
	Tablet,
	Tv,
	CarPlay,
	Desktop,
}

impl DeviceType {
	pub fn tag_value(self) -> &'static str {
		match self {
			DeviceType::Phone => values::DEVICE_PHONE,
			DeviceType::Tablet => values::DEVICE_TABLET,
			DeviceType::Tv => values::DEVICE_TV,
			DeviceType::CarPlay => values::DEVICE_CAR_PLAY,
			DeviceType::Desktop => values::DEVICE_DESKTOP,
		}
	}
}

/// Host-supplied device facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
	pub model: Option<String>,
	pub device_type: Option<DeviceType>,
	pub os_version: Option<String>,
	pub screen_width: Option<u32>,
	pub screen_height: Option<u32>,
}

/// Read-only attribute set attached to every event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
	attributes: Payload,
}

impl EventMetadata {
	/// Attributes detected from the running process, computed once.
	pub fn detected() -> &'static EventMetadata {
		DETECTED.get_or_init(|| {
			let metadata = Self::detect();
			tracing::debug!(attributes = metadata.attributes.len(), "detected event metadata");
			metadata
		})
	}

	/// Detected attributes with the profile's fields layered on top.
	pub fn with_profile(profile: &DeviceProfile) -> EventMetadata {
		let mut attributes = Self::detected().attributes.clone();

		if let Some(model) = &profile.model {
			attributes.set(tags::MOBILE_DEVICE_MODEL, model.as_str());
		}
		if let Some(device_type) = profile.device_type {
			attributes.set(tags::DEVICE_TYPE, device_type.tag_value());
		}
		if let Some(os_version) = &profile.os_version {
			attributes.set(tags::OPERATING_SYSTEM_VERSION, os_version.as_str());
		}
		if let Some(width) = profile.screen_width {
			attributes.set(tags::DEVICE_SCREEN_WIDTH, width);
		}
		if let Some(height) = profile.screen_height {
			attributes.set(tags::DEVICE_SCREEN_HEIGHT, height);
		}

		EventMetadata { attributes }
	}

	/// Replaces the reported SDK version, for hosts that embed the tracker
	/// in their own versioned SDK.
	pub fn with_sdk_version(mut self, version: impl Into<String>) -> Self {
		self.attributes.set(tags::SDK_VERSION, version.into());
		self
	}

	pub fn attributes(&self) -> &Payload {
		&self.attributes
	}

	pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
		self.attributes.get(key)
	}

	fn detect() -> EventMetadata {
		let mut attributes = Payload::new()
			.insert(tags::SDK_VERSION, SDK_VERSION)
			.insert(tags::PRODUCT, values::PRODUCT)
			.insert(tags::PAGE_TECHNOLOGY_FRAMEWORK, values::FRAMEWORK)
			.insert(tags::COMPONENT, values::COMPONENT);

		if let Some(os) = operating_system_name(std::env::consts::OS) {
			attributes.set(tags::OPERATING_SYSTEM, os);
		}
		if !std::env::consts::ARCH.is_empty() {
			attributes.set(tags::MOBILE_DEVICE_MODEL, std::env::consts::ARCH);
		}

		EventMetadata { attributes }
	}
}

fn operating_system_name(os: &str) -> Option<&'static str> {
	match os {
		"ios" => Some("iOS"),
		"android" => Some("Android"),
		"macos" => Some("macOS"),
		"linux" => Some("Linux"),
		"windows" => Some("Windows"),
		"freebsd" => Some("FreeBSD"),
		_ => None,
	}
}
