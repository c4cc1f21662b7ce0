// Copyright (c) 2026 Ouroboros Contributors
// SPDX-License-Identifier: AGPL-3.0

// Tracing subscriber setup for embedding binaries.
//
// RUST_LOG wins over the configured level. Installing twice is an error
// rather than a panic so tests and hosts that already own a subscriber can
// call this freely.

use anyhow::{anyhow, Context, Result};

use crate::domain::config::LoggingConfig;

pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
