// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! The emulator-facing side of Faultynet. A [`FaultControllerStarter`]
//! loads a YAML configuration, resolves every symbolic identifier against
//! the topology snapshot, spawns the injector process, and then drives it
//! through the framed control protocol: `start` begins the injection run,
//! `advance` steps manual-mode strategies, `stop` shuts the run down, and
//! `is_active` reports whether the injector is still working.

pub mod resolve;
pub mod spawn;

use anyhow::Context;
use faultynet_common::{Config, TopologySnapshot};
use faultynet_ipc::blocking::BlockingTransport;
use faultynet_ipc::{ControlMessage, ProtocolError};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout};
use tracing::{debug, info, warn};

pub struct FaultControllerStarter {
    child: Child,
    transport: BlockingTransport<ChildStdout, ChildStdin>,
    faults_are_active: bool,
    shutdown_on_drop: bool,
}

impl FaultControllerStarter {
    /// Loads the configuration, resolves it, spawns the injector process
    /// and blocks until it signals readiness.
    pub fn new(
        topology: &TopologySnapshot,
        config_path: impl AsRef<Path>,
    ) -> anyhow::Result<FaultControllerStarter> {
        let mut config = Config::load(config_path.as_ref())?;
        resolve::prepare(&mut config, topology);
        Self::with_resolved_config(&config)
    }

    /// Spawns the injector from an already-resolved configuration.
    pub fn with_resolved_config(config: &Config) -> anyhow::Result<FaultControllerStarter> {
        let mut child = spawn::spawn_injector(config)?;
        let stdin = child
            .stdin
            .take()
            .context("injector child has no stdin pipe")?;
        let stdout = child
            .stdout
            .take()
            .context("injector child has no stdout pipe")?;
        let mut transport = BlockingTransport::new(stdout, stdin);

        debug!("fault process started");
        match transport.recv() {
            Ok(ControlMessage::SetupDone) => {
                debug!("fault controller has signalled that it's ready")
            }
            Ok(other) => warn!("fault controller has sent weird message: {other}"),
            Err(err) => {
                let _ = child.kill();
                return Err(err).context("injector failed during setup");
            }
        }

        Ok(FaultControllerStarter {
            child,
            transport,
            faults_are_active: false,
            shutdown_on_drop: false,
        })
    }

    /// Tells the controller to start injecting. Not to be confused with
    /// [`advance`](Self::advance), which steps an already started
    /// controller. Also arms the shutdown-on-drop guard so a vanishing
    /// starter doesn't leave the injector running.
    pub fn start(&mut self) {
        info!("initiating faults");
        self.faults_are_active = true;
        self.shutdown_on_drop = true;
        self.send(ControlMessage::StartInjecting);
    }

    /// Tells the controller to start its next iteration. A no-op for
    /// automatic-mode strategies.
    pub fn advance(&mut self) {
        self.send(ControlMessage::StartNextRun);
    }

    /// Tells the controller to shut down now, or after its current
    /// iteration.
    pub fn stop(&mut self) {
        self.shutdown_on_drop = false;
        self.send(ControlMessage::Shutdown);
    }

    /// True while the injector is still working. Drains the inbound pipe
    /// without blocking and latches false once `INJECTION_DONE` arrives.
    pub fn is_active(&mut self) -> bool {
        if !self.faults_are_active {
            return false;
        }
        loop {
            match self.transport.poll() {
                Ok(None) => return true,
                Ok(Some(ControlMessage::InjectionDone)) => {
                    self.faults_are_active = false;
                    self.shutdown_on_drop = false;
                    return false;
                }
                // "I'm done injecting" is the only message we expect here;
                // anything else is drained and dropped.
                Ok(Some(other)) => debug!("ignoring message {other} on the done pipe"),
                Err(ProtocolError::Closed) | Err(ProtocolError::Io(_)) => {
                    warn!("injector pipe closed unexpectedly");
                    self.faults_are_active = false;
                    self.shutdown_on_drop = false;
                    return false;
                }
                Err(err) => debug!("discarding: {err}"),
            }
        }
    }

    /// Waits for the injector process to exit. Callers normally do this
    /// after `is_active` has turned false.
    pub fn wait(&mut self) -> anyhow::Result<std::process::ExitStatus> {
        Ok(self.child.wait()?)
    }

    fn send(&mut self, message: ControlMessage) {
        if let Err(err) = self.transport.send(message) {
            warn!("could not send {message} to the injector: {err}");
        }
    }
}

impl Drop for FaultControllerStarter {
    fn drop(&mut self) {
        if self.shutdown_on_drop {
            self.send(ControlMessage::Shutdown);
        }
    }
}
