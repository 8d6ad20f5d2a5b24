// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! The Faultynet injector process.
//!
//! Spawned by the starter with a resolved configuration, it drives
//! time-structured faults against network interfaces (`tc`/`netem`/`tbf`/
//! `mirred`/`ifconfig`) and processes (`stress-ng`, arbitrary commands)
//! while a cooperative logger samples injector state. Communication with
//! the starter happens exclusively over two stdio pipes carrying the frames
//! of [`faultynet_ipc`].

pub mod command;
pub mod config;
pub mod context;
pub mod controller;
pub mod link;
pub mod logger;
pub mod node;
pub mod registry;
pub mod shell;

pub use context::ControllerContext;
pub use controller::FaultController;
pub use link::LinkInjector;
pub use logger::FaultLogger;
pub use node::NodeInjector;
pub use registry::{ActiveFault, FaultRegistry};
pub use shell::{CommandOutput, CommandRunner, SystemRunner};
