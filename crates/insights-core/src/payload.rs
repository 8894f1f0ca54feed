// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The attribute mapping carried by every tracked event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed event attributes.
///
/// Values are expected to be scalars (string, number, bool or null); the
/// [`codec`](crate::codec) rejects anything else when an event is stored.
///
/// # Example
///
/// ```
/// use insights_core::Payload;
///
/// let params = Payload::new()
///     .insert("link", "select-transfer-method")
///     .insert("country", "CA")
///     .insert("amount", 25.5)
///     .insert("is_default", true);
/// assert_eq!(params.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
	inner: Map<String, Value>,
}

impl Payload {
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair, builder style.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts a key-value pair in place, replacing any previous value.
	pub fn set<K, V>(&mut self, key: K, value: V)
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
	}

	/// Merges `other` into this payload; keys in `other` win.
	pub fn merge(mut self, other: &Payload) -> Self {
		self.extend_from(other);
		self
	}

	/// In-place form of [`Payload::merge`].
	pub fn extend_from(&mut self, other: &Payload) {
		for (k, v) in &other.inner {
			self.inner.insert(k.clone(), v.clone());
		}
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	/// Returns the value for `key` when it is a string.
	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.inner.get(key).and_then(Value::as_str)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.inner.contains_key(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.inner.iter()
	}

	/// First key whose value is an array or object, if any.
	pub fn first_non_scalar(&self) -> Option<&str> {
		self
			.inner
			.iter()
			.find(|(_, v)| v.is_array() || v.is_object())
			.map(|(k, _)| k.as_str())
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.inner
	}

	pub fn into_map(self) -> Map<String, Value> {
		self.inner
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.inner)
	}
}

impl From<Payload> for Value {
	fn from(payload: Payload) -> Self {
		payload.into_value()
	}
}

impl From<Map<String, Value>> for Payload {
	fn from(map: Map<String, Value>) -> Self {
		Self { inner: map }
	}
}

impl<K, V> FromIterator<(K, V)> for Payload
where
	K: Into<String>,
	V: Into<Value>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			inner: iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}
}
