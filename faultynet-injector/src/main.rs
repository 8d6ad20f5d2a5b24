// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Injector process entrypoint. Stdin and stdout carry the control frames;
//! diagnostics go to stderr so they never interfere with the protocol.

use faultynet_injector::config::{self, ENV_LOG_FILTER};
use faultynet_injector::{FaultController, SystemRunner};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(ENV_LOG_FILTER).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = config::from_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let controller = FaultController::new(
            &config,
            Arc::new(SystemRunner),
            tokio::io::stdin(),
            tokio::io::stdout(),
        );
        controller.run().await
    })?;

    info!("fault injector exiting");
    Ok(())
}
