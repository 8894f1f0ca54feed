// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Insights FPTI (First-Party Tracking Infrastructure)
//! event pipeline.
//!
//! This crate holds everything the tracker needs that does not touch the
//! network or a database:
//!
//! - [`tags`]: the FPTI wire vocabulary and [`EventType`]
//! - [`Payload`]: the string-keyed attribute mapping carried by each event
//! - [`codec`]: text encoding of payloads for storage and transmission
//! - [`EventMetadata`]: device/SDK attributes merged into every event
//! - [`TrackerOptions`]: tuning knobs and their layered configuration

pub mod codec;
pub mod config;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod payload;
pub mod tags;
pub mod time;

pub use codec::{decode, encode};
pub use config::{load_options, TrackerOptions, TrackerOptionsLayer};
pub use error::{CodecError, ConfigError};
pub use ids::{EventId, SessionId};
pub use metadata::{DeviceProfile, DeviceType, EventMetadata};
pub use payload::Payload;
pub use tags::EventType;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
