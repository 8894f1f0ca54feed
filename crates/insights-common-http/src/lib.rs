// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for the Insights SDK.
//!
//! - A pre-configured HTTP client builder carrying the SDK User-Agent
//! - Retry with exponential backoff for transient delivery failures

mod client;
mod retry;

pub use client::{builder, builder_with_user_agent, user_agent};
pub use retry::{retry, RetryConfig, RetryableError};
