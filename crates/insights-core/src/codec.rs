// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Text encoding of payloads.
//!
//! Payloads are stored and transmitted as compact JSON objects. Encoding
//! fails for nested values so that a stored row always decodes back to a
//! flat attribute map.

use serde_json::Value;

use crate::error::CodecError;
use crate::payload::Payload;

/// Encodes a payload as a JSON object.
pub fn encode(payload: &Payload) -> Result<String, CodecError> {
	if let Some(key) = payload.first_non_scalar() {
		return Err(CodecError::NonScalarValue {
			key: key.to_string(),
		});
	}

	Ok(serde_json::to_string(payload.as_map())?)
}

/// Decodes text produced by [`encode`].
pub fn decode(text: &str) -> Result<Payload, CodecError> {
	match serde_json::from_str::<Value>(text)? {
		Value::Object(map) => Ok(Payload::from(map)),
		_ => Err(CodecError::NotAnObject),
	}
}
