// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! The control protocol between the emulator-side starter and the injector
//! process: a closed set of symbolic messages carried as length-delimited
//! UTF-8 frames (u32 big-endian length prefix) over the child's stdio pipes.
//!
//! The injector side speaks the protocol asynchronously
//! ([`FrameReader`]/[`FrameWriter`]); the starter side uses a
//! [`blocking::BlockingTransport`] that can also poll the inbound pipe
//! without blocking, which `is_active` relies on.

pub mod blocking;
mod message;
mod transport;

pub use message::{ControlMessage, ProtocolError};
pub use transport::{FrameReader, FrameWriter};
