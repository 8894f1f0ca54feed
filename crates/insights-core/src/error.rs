// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for payload encoding and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// A payload could not be converted to or from its text form.
#[derive(Debug, Error)]
pub enum CodecError {
	/// Payload values must be strings, numbers, booleans or null.
	#[error("value for key '{key}' is not a scalar")]
	NonScalarValue { key: String },

	/// The text decoded to valid JSON that is not an object.
	#[error("encoded payload is not a JSON object")]
	NotAnObject,

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading and validating tracker options.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("TOML parse error in {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid value for {field}: {message}")]
	InvalidValue { field: String, message: String },

	#[error("validation error: {0}")]
	Validation(String),
}

impl ConfigError {
	pub fn validation(msg: impl Into<String>) -> Self {
		Self::Validation(msg.into())
	}

	pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			field: field.into(),
			message: message.into(),
		}
	}
}
