// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Shell execution seam. Injectors and the fault logger go through
//! [`CommandRunner`] so tests can observe and script every invocation
//! without touching `tc` or `stress-ng`.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Wall-time threshold above which an invocation is reported. Blocking
/// commands stall the whole cooperative loop, including log generation.
const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code; -1 when the process was killed by a signal or
    /// could not be spawned at all.
    pub retcode: i32,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> CommandOutput {
        CommandOutput {
            retcode: 0,
            output: output.into(),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> CommandOutput;
}

/// Runs commands through `sh -c` on the host. Long-running tools are
/// expected to background themselves with a trailing `&`.
#[derive(Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &str) -> CommandOutput {
        debug!("executing: '{command}'");
        let started = tokio::time::Instant::now();
        let result = Command::new("sh").arg("-c").arg(command).output().await;
        if started.elapsed() > SLOW_COMMAND_THRESHOLD {
            warn!(
                "command '{command}' took more than {}s to execute; blocking commands \
                 can lead to unexpected outcomes, like logs not generating",
                SLOW_COMMAND_THRESHOLD.as_secs()
            );
        }
        match result {
            Ok(output) => {
                let retcode = output.status.code().unwrap_or(-1);
                if retcode == 0 {
                    debug!("command '{command}' terminated correctly (retcode {retcode})");
                } else {
                    debug!("command '{command}' terminated not correctly (retcode {retcode})");
                }
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutput {
                    retcode,
                    output: combined,
                }
            }
            Err(err) => {
                error!("failed to spawn '{command}': {err}");
                CommandOutput {
                    retcode: -1,
                    output: err.to_string(),
                }
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod recording {
    //! A scriptable [`CommandRunner`] used by the crate's tests.

    use super::{CommandOutput, CommandRunner};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, Clone)]
    pub struct RecordedCommand {
        pub command: String,
        pub at: Instant,
    }

    #[derive(Debug)]
    pub struct RecordingRunner {
        recorded: Mutex<Vec<RecordedCommand>>,
        responses: Mutex<Vec<(String, CommandOutput)>>,
    }

    impl Default for RecordingRunner {
        fn default() -> Self {
            RecordingRunner {
                recorded: Mutex::new(Vec::new()),
                responses: Mutex::new(Vec::new()),
            }
        }
    }

    impl RecordingRunner {
        /// Scripts the response for any command containing `needle`. Later
        /// registrations win over earlier ones.
        pub fn respond(&self, needle: &str, output: CommandOutput) {
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((needle.to_string(), output));
        }

        pub fn commands(&self) -> Vec<String> {
            self.recorded
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|r| r.command.clone())
                .collect()
        }

        pub fn recorded(&self) -> Vec<RecordedCommand> {
            self.recorded
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str) -> CommandOutput {
            self.recorded
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(RecordedCommand {
                    command: command.to_string(),
                    at: Instant::now(),
                });
            let responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
            responses
                .iter()
                .rev()
                .find(|(needle, _)| command.contains(needle))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| CommandOutput::ok(""))
        }
    }
}
