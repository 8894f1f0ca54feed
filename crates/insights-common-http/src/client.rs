// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP client builder with a consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Creates a client builder with the standard Insights User-Agent header.
///
/// # Example
/// ```ignore
/// let client = insights_common_http::builder()
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a client builder with a caller-chosen User-Agent header.
///
/// Hosts embedding the SDK use this to report their own product string.
pub fn builder_with_user_agent(user_agent: impl Into<String>) -> ClientBuilder {
	Client::builder().user_agent(user_agent.into())
}

/// Returns the standard Insights User-Agent string.
///
/// Format: `insights/{os}-{arch}/{version}`
pub fn user_agent() -> String {
	format!(
		"insights/{}-{}/{}",
		std::env::consts::OS,
		std::env::consts::ARCH,
		env!("CARGO_PKG_VERSION")
	)
}
