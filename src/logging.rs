// SPDX-License-Identifier: GPL-3.0-or-later
// This file is part of casm.
// Copyright (C) 2025  The casm contributors

//! Tracing setup shared by the CLI and tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a compact `tracing` subscriber once per process.
///
/// An explicit level wins; otherwise `RUST_LOG` is consulted, falling
/// back to `info`. Safe to call when a subscriber is already installed.
pub fn init_with_level(level: Option<&str>) {
    INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }

        let env = match level {
            Some(level) if !level.is_empty() => level.to_string(),
            _ => std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        let filter = tracing_subscriber::EnvFilter::try_new(env.clone()).unwrap_or_else(|error| {
            eprintln!("WARN: invalid log filter '{env}': {error}; using 'info'");
            tracing_subscriber::EnvFilter::new("info")
        });

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init();
    });
}
