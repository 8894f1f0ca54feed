// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! FPTI tag keys and well-known tag values.
//!
//! Keys are the short names the collector expects on the wire.

use serde::{Deserialize, Serialize};

pub const EVENT_TYPE: &str = "e";
pub const TIMESTAMP: &str = "t";
pub const PAGE_NAME: &str = "page";
pub const PAGE_GROUP: &str = "pgrp";
pub const LINK: &str = "link";
pub const MOBILE_DEVICE_MODEL: &str = "mdvs";
pub const PAGE_TECHNOLOGY_FRAMEWORK: &str = "pgtf";
pub const IP_ADDRESS: &str = "ip";
pub const SESSION_ID: &str = "vid";
pub const DEVICE_TYPE: &str = "dvis";
pub const PRODUCT: &str = "product";
pub const DEVICE_SCREEN_WIDTH: &str = "sw";
pub const DEVICE_SCREEN_HEIGHT: &str = "sh";
pub const OPERATING_SYSTEM: &str = "os";
pub const OPERATING_SYSTEM_VERSION: &str = "osv";
pub const SDK_VERSION: &str = "sdk_version";
/// Filled server-side from Accept-Language; listed so hosts don't reuse it.
pub const LANGUAGE: &str = "rsta";
pub const COMPONENT: &str = "comp";
/// Unique per session.
pub const TRACKING_VISIT_ID: &str = "tracking_visit_id";
/// The signed-in user's token.
pub const TRACKING_VISITOR_ID: &str = "tracking_visitor_id";

pub const ERROR_FIELD_NAME: &str = "erfd";
pub const ERROR_CODE: &str = "error_code";
pub const ERROR_MESSAGE: &str = "error_message";
pub const ERROR_TYPE: &str = "error_type";
pub const ERROR_DESCRIPTION: &str = "error_description";

/// Tag values with a fixed vocabulary.
pub mod values {
	pub const DEVICE_PHONE: &str = "Mobile Phone";
	pub const DEVICE_TABLET: &str = "Tablet";
	pub const DEVICE_TV: &str = "TV";
	pub const DEVICE_CAR_PLAY: &str = "CarPlay";
	pub const DEVICE_DESKTOP: &str = "Desktop";

	pub const ERROR_TYPE_API: &str = "API";
	pub const ERROR_TYPE_FORM: &str = "FORM";
	pub const ERROR_TYPE_CONNECTION: &str = "CONNECTION";
	pub const ERROR_TYPE_EXCEPTION: &str = "EXCEPTION";
	pub const ERROR_CODE_CONNECTION: &str = "TIMEOUT";

	pub const PRODUCT: &str = "mobile-ui-sdk";
	pub const FRAMEWORK: &str = "rust";
	pub const COMPONENT: &str = "hyperwallet";
}

/// The kind of interaction an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	Click,
	Impression,
	Error,
}

impl EventType {
	/// The discriminator written under [`EVENT_TYPE`].
	pub fn tag_value(self) -> &'static str {
		match self {
			EventType::Click => "cl",
			EventType::Impression => "im",
			EventType::Error => "er",
		}
	}
}

impl std::fmt::Display for EventType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			EventType::Click => write!(f, "click"),
			EventType::Impression => write!(f, "impression"),
			EventType::Error => write!(f, "error"),
		}
	}
}

impl std::str::FromStr for EventType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"click" | "cl" => Ok(EventType::Click),
			"impression" | "im" => Ok(EventType::Impression),
			"error" | "er" => Ok(EventType::Error),
			other => Err(format!("unknown event type: {other}")),
		}
	}
}
