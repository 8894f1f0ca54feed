// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and environment
//! variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, trace};

use super::TrackerOptionsLayer;
use crate::error::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<TrackerOptionsLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<TrackerOptionsLayer, ConfigError> {
		Ok(TrackerOptionsLayer::default())
	}
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
	#[serde(default)]
	tracker: Option<TrackerOptionsLayer>,
}

/// TOML file source. Options live under a `[tracker]` table.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<TrackerOptionsLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(TrackerOptionsLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let file: ConfigFile = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed tracker options from TOML");
		Ok(file.tracker.unwrap_or_default())
	}
}

/// Environment variable source.
///
/// Convention: `INSIGHTS_TRACKER_<FIELD>`, e.g. `INSIGHTS_TRACKER_MAX_BATCH_SIZE`.
pub struct EnvSource {
	vars: Option<HashMap<String, String>>,
}

impl EnvSource {
	pub const PREFIX: &'static str = "INSIGHTS_TRACKER_";

	/// Reads the process environment.
	pub fn process() -> Self {
		Self { vars: None }
	}

	/// Reads from a fixed set of variables instead of the process environment.
	pub fn from_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
		}
	}

	fn lookup(&self, field: &str) -> Option<String> {
		let key = format!("{}{}", Self::PREFIX, field.to_ascii_uppercase());
		match &self.vars {
			Some(vars) => vars.get(&key).cloned(),
			None => std::env::var(&key).ok(),
		}
	}

	fn parse<T: FromStr>(&self, field: &str) -> Result<Option<T>, ConfigError>
	where
		T::Err: std::fmt::Display,
	{
		match self.lookup(field) {
			None => Ok(None),
			Some(raw) => raw
				.trim()
				.parse::<T>()
				.map(Some)
				.map_err(|e| ConfigError::invalid_value(field, format!("'{raw}': {e}"))),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<TrackerOptionsLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(TrackerOptionsLayer {
			auto_flush_timer_interval_secs: self.parse("auto_flush_timer_interval_secs")?,
			max_batch_size: self.parse("max_batch_size")?,
			max_flush_attempts: self.parse("max_flush_attempts")?,
			retry_counts_for_event_dispatch: self.parse("retry_counts_for_event_dispatch")?,
			network_dispatch_timeout_secs: self.parse("network_dispatch_timeout_secs")?,
			buffer_time_to_wait_before_flush_ms: self.parse("buffer_time_to_wait_before_flush_ms")?,
			keep_session_alive_interval_secs: self.parse("keep_session_alive_interval_secs")?,
			cache_threshold_days: self.parse("cache_threshold_days")?,
		})
	}
}
