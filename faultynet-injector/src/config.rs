// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Injector-process configuration ingest. The starter serializes the fully
//! resolved configuration to JSON and passes it through the environment of
//! the spawned process; nothing else crosses the process boundary besides
//! the control frames.

use anyhow::Context;
use faultynet_common::Config;

pub use faultynet_common::ENV_INJECTOR_CONFIG;

/// Environment variable holding the injector's log filter (EnvFilter
/// syntax). Defaults to `info`.
pub const ENV_LOG_FILTER: &str = "FAULTYNET_LOG";

pub fn from_env() -> anyhow::Result<Config> {
    let json = std::env::var(ENV_INJECTOR_CONFIG)
        .with_context(|| format!("{ENV_INJECTOR_CONFIG} is not set"))?;
    Config::from_json(&json).context("malformed resolved configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_reported() {
        // No other test in this binary touches the variable.
        std::env::remove_var(ENV_INJECTOR_CONFIG);
        assert!(from_env().is_err());
    }

    #[test]
    fn json_round_trips_into_a_config() {
        let config = Config {
            injection_time: Some(2.0),
            ..Default::default()
        };
        let parsed = Config::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
