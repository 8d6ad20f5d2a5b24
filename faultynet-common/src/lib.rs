// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod identifier;
pub mod topology;

pub use config::{
    parse_fault_type, Config, ConfigError, FaultEntry, FaultKind, FaultPattern, FaultSpec,
    LinkEnd, LinkFaultType, LogCommand, LogConfig, NodeFaultType, ParsedFaultType, Protocol,
    ResolvedLink, RunMode, StrategyKind, TargetTraffic, TrafficFilter, Window,
    ENV_INJECTOR_CONFIG,
};
pub use identifier::{Identifier, ResolvedTarget};
pub use topology::{Endpoint, Link, Node, NodeKind, TopologySnapshot};
