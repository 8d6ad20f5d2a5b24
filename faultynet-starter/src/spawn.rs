// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Spawns the injector binary with the resolved configuration in its
//! environment and its stdio wired up as the control pipes. Stderr is
//! inherited so injector diagnostics reach the operator.

use anyhow::Context;
use faultynet_common::{Config, ENV_INJECTOR_CONFIG};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Overrides the injector binary location; useful for tests and
/// non-standard installations.
pub const ENV_INJECTOR_BIN: &str = "FAULTYNET_INJECTOR_BIN";

const INJECTOR_BIN_NAME: &str = "faultynet-injector";

/// The injector binary: the env override, a sibling of the current
/// executable, or the bare name resolved through PATH.
pub fn injector_binary() -> PathBuf {
    if let Some(path) = std::env::var_os(ENV_INJECTOR_BIN) {
        return PathBuf::from(path);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join(INJECTOR_BIN_NAME);
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from(INJECTOR_BIN_NAME)
}

pub fn spawn_injector(config: &Config) -> anyhow::Result<Child> {
    let binary = injector_binary();
    let json = config.to_json()?;
    Command::new(&binary)
        .env(ENV_INJECTOR_CONFIG, json)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("could not spawn injector binary {}", binary.display()))
}
