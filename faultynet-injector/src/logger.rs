// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Periodic fault logger. Each tick snapshots the active-fault registry,
//! runs the configured diagnostic commands, and enqueues a record; `stop()`
//! ends the loop and flushes everything to disk as one pretty-printed JSON
//! array. `write_log_to_file` is idempotent: calling it again without new
//! ticks rewrites the same file.

use crate::command::nsenter_all;
use crate::registry::{ActiveFault, FaultRegistry};
use crate::shell::CommandRunner;
use faultynet_common::{LogCommand, LogConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_LOG_PATH: &str = "faultynet_faultlogfile.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSample {
    pub tag: String,
    pub command: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub time_ms: i64,
    pub time_since_start_ms: i64,
    pub active_faults: Vec<ActiveFault>,
    pub commands: Vec<CommandSample>,
}

pub struct FaultLogger {
    interval: Duration,
    path: PathBuf,
    commands: Vec<LogCommand>,
    registry: Arc<FaultRegistry>,
    runner: Arc<dyn CommandRunner>,
    records: Mutex<Vec<LogRecord>>,
    stop: CancellationToken,
}

impl FaultLogger {
    pub fn new(
        config: &LogConfig,
        registry: Arc<FaultRegistry>,
        runner: Arc<dyn CommandRunner>,
    ) -> FaultLogger {
        let interval = match config.interval {
            None | Some(0) => DEFAULT_LOG_INTERVAL,
            Some(ms) => Duration::from_millis(ms),
        };
        let path = config
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));
        FaultLogger {
            interval,
            path,
            commands: config.commands.clone(),
            registry,
            runner,
            records: Mutex::new(Vec::new()),
            stop: CancellationToken::new(),
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Samples until stopped, then flushes to disk. The first sample is
    /// taken immediately.
    pub async fn go(self: Arc<Self>) {
        let start_ms = now_ms();
        loop {
            self.sample(start_ms).await;
            let slept = tokio::select! {
                _ = self.stop.cancelled() => false,
                _ = tokio::time::sleep(self.interval) => true,
            };
            if !slept {
                break;
            }
        }
        // Others may also ask for a flush later; they only ever see
        // additional records, nothing is lost.
        self.write_log_to_file();
    }

    pub fn stop(&self) {
        debug!("stopping fault logger");
        self.stop.cancel();
    }

    async fn sample(&self, start_ms: i64) {
        let time_ms = now_ms();
        debug!("generating fault log entry");
        let active_faults = self.registry.snapshot();
        let commands = self.run_debug_commands().await;
        self.records().push(LogRecord {
            time_ms,
            time_since_start_ms: time_ms - start_ms,
            active_faults,
            commands,
        });
    }

    async fn run_debug_commands(&self) -> Vec<CommandSample> {
        let mut samples = Vec::with_capacity(self.commands.len());
        for command in &self.commands {
            let full_command = match command.host_pid {
                Some(pid) => nsenter_all(Some(pid), &command.command),
                None => command.command.clone(),
            };
            let result = self.runner.run(&full_command).await;
            samples.push(CommandSample {
                tag: command.tag.clone().unwrap_or_default(),
                command: command.command.clone(),
                output: result.output,
            });
        }
        samples
    }

    /// Writes all records collected so far. Safe to call multiple times;
    /// later calls include any later-enqueued records.
    pub fn write_log_to_file(&self) {
        info!("writing fault logs to {}", self.path.display());
        let records = self.records().clone();
        let json = match serde_json::to_string_pretty(&records) {
            Ok(json) => json,
            Err(err) => {
                warn!("could not serialize fault logs: {err}");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, json) {
            warn!("could not write fault logs to {}: {err}", self.path.display());
        }
    }

    #[cfg(test)]
    fn record_count(&self) -> usize {
        self.records().len()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::recording::RecordingRunner;
    use crate::shell::CommandOutput;

    fn logger_with(
        config: LogConfig,
        runner: Arc<RecordingRunner>,
    ) -> (Arc<FaultLogger>, Arc<FaultRegistry>) {
        let registry = Arc::new(FaultRegistry::default());
        let logger = Arc::new(FaultLogger::new(&config, registry.clone(), runner));
        (logger, registry)
    }

    fn temp_log_config(dir: &tempfile::TempDir, interval: Option<u64>) -> LogConfig {
        LogConfig {
            interval,
            path: Some(dir.path().join("faultlog.json")),
            commands: Vec::new(),
        }
    }

    #[test]
    fn defaults_apply_when_config_is_empty() {
        let runner = Arc::new(RecordingRunner::default());
        let (logger, _) = logger_with(LogConfig::default(), runner);
        assert_eq!(logger.interval, DEFAULT_LOG_INTERVAL);
        assert_eq!(logger.path, PathBuf::from(DEFAULT_LOG_PATH));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_accumulate_records_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let (logger, registry) = logger_with(temp_log_config(&dir, Some(1000)), runner);

        registry.set_active("t1", "loss", "tc qdisc add", 0);
        let task = tokio::spawn(logger.clone().go());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        logger.stop();
        task.await.unwrap();

        // Samples at 0s, 1s, 2s, 3s.
        assert_eq!(logger.record_count(), 4);
        let records: Vec<LogRecord> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("faultlog.json")).unwrap())
                .unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].active_faults[0].fault_tag, "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn diagnostic_commands_enter_the_resolved_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        runner.respond("ifconfig", CommandOutput::ok("eth0: flags=..."));
        let config = LogConfig {
            interval: Some(1000),
            path: Some(dir.path().join("faultlog.json")),
            commands: vec![
                LogCommand {
                    tag: Some("ifc".into()),
                    host: Some("h1".into()),
                    command: "ifconfig".into(),
                    host_pid: Some(101),
                },
                LogCommand {
                    tag: Some("root".into()),
                    host: None,
                    command: "date".into(),
                    host_pid: None,
                },
            ],
        };
        let (logger, _) = logger_with(config, runner.clone());

        let task = tokio::spawn(logger.clone().go());
        tokio::time::sleep(Duration::from_millis(10)).await;
        logger.stop();
        task.await.unwrap();

        let commands = runner.commands();
        assert_eq!(
            commands[0],
            "nsenter --target 101 --net --pid --all ifconfig"
        );
        assert_eq!(commands[1], "date");

        let records: Vec<LogRecord> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("faultlog.json")).unwrap())
                .unwrap();
        let samples = &records[0].commands;
        assert_eq!(samples[0].tag, "ifc");
        assert_eq!(samples[0].command, "ifconfig");
        assert_eq!(samples[0].output, "eth0: flags=...");
    }

    #[tokio::test(start_paused = true)]
    async fn double_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let (logger, _) = logger_with(temp_log_config(&dir, Some(1000)), runner);

        let task = tokio::spawn(logger.clone().go());
        tokio::time::sleep(Duration::from_millis(10)).await;
        logger.stop();
        task.await.unwrap();

        let path = dir.path().join("faultlog.json");
        let first = std::fs::read_to_string(&path).unwrap();
        logger.write_log_to_file();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }
}
