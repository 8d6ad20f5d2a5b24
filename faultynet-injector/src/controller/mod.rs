// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Controller lifecycle. After construction the controller announces
//! `SETUP_DONE` and blocks on the inbound pipe; the first frame must be
//! `START_INJECTING`. Once started it schedules the strategy's injector
//! tasks, the optional fault logger and a pipe listener cooperatively, and
//! announces `INJECTION_DONE` when the strategy completes on its own.

pub mod config_file;
pub mod log_only;
pub mod most_used;
pub mod random_links;
pub mod strategy;

use crate::context::ControllerContext;
use crate::logger::FaultLogger;
use crate::shell::CommandRunner;
use config_file::ConfigFileStrategy;
use faultynet_common::{Config, StrategyKind};
use faultynet_ipc::{ControlMessage, FrameReader, FrameWriter, ProtocolError};
use log_only::LogOnlyStrategy;
use most_used::MostUsedLinkStrategy;
use random_links::RandomLinksStrategy;
use std::sync::Arc;
use strategy::InjectionStrategy;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info};

pub fn build_strategy(config: &Config) -> Box<dyn InjectionStrategy> {
    match config.strategy() {
        StrategyKind::ConfigFile => Box::new(ConfigFileStrategy::from_config(config)),
        StrategyKind::RandomLinks => Box::new(RandomLinksStrategy::from_config(config)),
        StrategyKind::MostUsedLink => Box::new(MostUsedLinkStrategy::from_config(config)),
        StrategyKind::LogOnly => Box::new(LogOnlyStrategy),
    }
}

pub struct FaultController<R, W> {
    inbound: FrameReader<R>,
    outbound: FrameWriter<W>,
    strategy: Box<dyn InjectionStrategy>,
    logger: Option<Arc<FaultLogger>>,
    ctx: ControllerContext,
}

impl<R, W> FaultController<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        config: &Config,
        runner: Arc<dyn CommandRunner>,
        inbound: R,
        outbound: W,
    ) -> FaultController<R, W> {
        let ctx = ControllerContext::new(runner);
        let logger = config.log.as_ref().map(|log_config| {
            debug!("config has enabled logging");
            Arc::new(FaultLogger::new(
                log_config,
                ctx.registry.clone(),
                ctx.runner.clone(),
            ))
        });
        let strategy = build_strategy(config);
        info!("fault controller configured with the {} strategy", strategy.name());
        FaultController {
            inbound: FrameReader::new(inbound),
            outbound: FrameWriter::new(outbound),
            strategy,
            logger,
            ctx,
        }
    }

    /// Full lifecycle: announce readiness, wait for the go command, run.
    pub async fn run(mut self) -> anyhow::Result<()> {
        debug!("sending setup finished command");
        self.outbound.send(ControlMessage::SetupDone).await?;

        info!("fault controller is waiting for go command");
        match self.inbound.recv().await {
            Ok(Some(ControlMessage::StartInjecting)) => {}
            Ok(Some(other)) => {
                error!("expected go command, received '{other}'");
                anyhow::bail!("protocol violation: unexpected first frame '{other}'");
            }
            Ok(None) => anyhow::bail!("control pipe closed before the go command"),
            Err(err) => {
                error!("protocol violation while waiting for go command: {err}");
                return Err(err.into());
            }
        }
        self.go().await
    }

    async fn go(self) -> anyhow::Result<()> {
        debug!("initiating faults");
        let FaultController {
            inbound,
            mut outbound,
            mut strategy,
            logger,
            ctx,
        } = self;

        let logger_task = logger.clone().map(|logger| tokio::spawn(logger.go()));
        let listener = tokio::spawn(listen_for_pipe_messages(
            inbound,
            ctx.clone(),
            logger.clone(),
        ));

        strategy.run(&ctx).await;

        // All faults have finished injecting (or we were deactivated), so
        // report done and tear the remaining tasks down.
        debug!("fault controller is initiating deactivation");
        outbound.send(ControlMessage::InjectionDone).await?;
        // Cancelling doubles as the self-addressed shutdown that unblocks
        // the pipe listener.
        ctx.cancel.cancel();
        if let Some(logger) = &logger {
            logger.stop();
        }
        if let Some(task) = logger_task {
            let _ = task.await;
        }
        let _ = listener.await;
        Ok(())
    }
}

/// Receives and processes the messages the starter sends mid-run:
/// `SHUTDOWN` deactivates everything, `START_NEXT_RUN` arms the next-run
/// latch for manual-mode strategies. Unknown frames are discarded with an
/// error log.
async fn listen_for_pipe_messages<R>(
    mut inbound: FrameReader<R>,
    ctx: ControllerContext,
    logger: Option<Arc<FaultLogger>>,
) where
    R: AsyncRead + Unpin + Send,
{
    debug!("fault controller listening for messages on pipe");
    loop {
        let frame = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            frame = inbound.recv() => frame,
        };
        match frame {
            Ok(Some(ControlMessage::Shutdown)) => {
                info!("fault controller received message for shutdown");
                if let Some(logger) = &logger {
                    logger.stop();
                }
                ctx.cancel.cancel();
                return;
            }
            Ok(Some(ControlMessage::StartNextRun)) => {
                debug!("fault controller received message for next run");
                ctx.next_run.set();
            }
            Ok(Some(other)) => {
                error!("received unexpected message '{other}' while listening on pipe");
            }
            Err(ProtocolError::UnknownFrame(frame)) => {
                error!("received unknown control frame '{frame}', discarding");
            }
            Ok(None) | Err(_) => {
                // The starter is gone; treat it like a shutdown.
                info!("control pipe closed, shutting down");
                if let Some(logger) = &logger {
                    logger.stop();
                }
                ctx.cancel.cancel();
                return;
            }
        }
    }
}
