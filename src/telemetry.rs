/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/telemetry.rs
*
* Structured logging setup. Log levels come from `RUST_LOG` (default `info`);
* the output is JSON for log shippers or plain text for local runs.
*
* SPDX-License-Identifier: Apache-2.0
*/

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_telemetry(format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (json, text) = match format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .try_init()
}
