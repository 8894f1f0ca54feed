// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracks a short page flow and delivers it to a collector.
//!
//! ```sh
//! INSIGHTS_API_URL=http://127.0.0.1:8080/track \
//! INSIGHTS_TRACKER_MAX_BATCH_SIZE=2 \
//! RUST_LOG=insights=debug \
//!   cargo run -p insights --example track -- ./insights.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use insights::{ErrorInfo, ErrorKind, Insights, InsightsConfig, Payload};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config_path = std::env::args().nth(1).map(PathBuf::from);
	let options = insights_core::load_options(config_path.as_deref())
		.context("failed to load tracker options")?;

	let api_url = std::env::var("INSIGHTS_API_URL")
		.unwrap_or_else(|_| "http://127.0.0.1:8080/track".to_string());
	let mut config = InsightsConfig::new(api_url).with_options(options);
	if let Ok(token) = std::env::var("INSIGHTS_USER_TOKEN") {
		config = config.with_user_token(token);
	}

	let insights = Insights::setup(config)
		.await
		.context("failed to start insights")?;

	let page = "transfer-method:add:select-transfer-method";
	insights.track_impression(
		page,
		"transfer-method",
		Payload::new().insert("country", "CA").insert("currency", "CAD"),
	);
	insights.track_click(page, "transfer-method", "select-transfer-method", Payload::new());
	insights.track_error(
		"transfer-method:add:bank-account",
		"transfer-method",
		&ErrorInfo::new(ErrorKind::Form)
			.with_code("INVALID_FIELD")
			.with_field_name("bankAccountId")
			.with_message("Bank account number is required"),
	);

	let outcome = insights.tracker().flush().await?;
	tracing::info!(?outcome, "flush finished");

	insights.shutdown().await?;
	Ok(())
}
