// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Per-interface fault state machine. One `LinkInjector` exclusively owns
//! the shell invocations for its `(pid, interface, tag)`; callers avoid
//! overlapping targets.

use crate::command::{render_link_commands, CommandOp, PatternForm};
use crate::context::{sleep_cancellable, ControllerContext};
use faultynet_common::{FaultPattern, LinkFaultType, TrafficFilter, Window};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct LinkInjector {
    pub pid: Option<i32>,
    pub interface: String,
    pub tag: String,
    pub fault: LinkFaultType,
    pub filter: TrafficFilter,
    pub type_args: Vec<String>,
    pub pattern: FaultPattern,
    pub pattern_args: Vec<String>,
    pub window: Window,
}

/// Degradation parameters with their defaults applied:
/// `(step_size, step_ms, start, end)` = `(5, 1000, 0, 100)`.
pub(crate) struct DegradationPlan {
    pub step_size: i64,
    pub step: Duration,
    pub start: i64,
    pub end: i64,
}

impl DegradationPlan {
    pub(crate) fn from_args(tag: &str, args: &[String], clamp_percent: bool) -> DegradationPlan {
        let step_size = match args.first().and_then(|a| a.parse().ok()) {
            Some(size) => size,
            None => {
                error!("{tag} does not have enough pattern args to define the degradation step, defaulting to 5");
                5
            }
        };
        let step_ms: u64 = match args.get(1).and_then(|a| a.parse().ok()) {
            Some(0) => {
                error!("{tag} degradation step length of 0ms is invalid, defaulting to 1000ms");
                1000
            }
            Some(ms) => ms,
            None => 1000,
        };
        let start = args.get(2).and_then(|a| a.parse().ok()).unwrap_or(0);
        let mut end = args.get(3).and_then(|a| a.parse().ok()).unwrap_or(100);
        if clamp_percent {
            end = end.min(100);
        }
        DegradationPlan {
            step_size,
            step: Duration::from_millis(step_ms),
            start,
            end,
        }
    }
}

/// Burst parameters: `(duration_ms, period_ms)`.
pub(crate) fn burst_args(args: &[String]) -> Option<(Duration, Duration)> {
    let duration: u64 = args.first()?.parse().ok()?;
    let period: u64 = args.get(1)?.parse().ok()?;
    if period == 0 {
        return None;
    }
    Some((
        Duration::from_millis(duration),
        Duration::from_millis(period),
    ))
}

impl LinkInjector {
    /// Drives the whole window: sleep `pre`, run the pattern loop, sleep
    /// `post`. Cancellation is observed at sleep boundaries; a fault that is
    /// enabled when the cancel arrives still gets its pairing disable.
    pub async fn run(&self, ctx: &ControllerContext) {
        info!(
            "fault {} waits {}s of pre-injection time",
            self.tag, self.window.pre
        );
        if !sleep_cancellable(self.window.pre(), &ctx.cancel).await {
            return;
        }

        match self.pattern {
            FaultPattern::Persistent => self.run_persistent(ctx).await,
            FaultPattern::Burst => self.run_burst(ctx).await,
            FaultPattern::Degradation => self.run_degradation(ctx).await,
        }

        info!(
            "fault {} waits {}s of post-injection time",
            self.tag, self.window.post
        );
        sleep_cancellable(self.window.post(), &ctx.cancel).await;
    }

    async fn run_persistent(&self, ctx: &ControllerContext) {
        info!(
            "fault {} starting static injection on nic {}",
            self.tag, self.interface
        );
        self.apply(ctx, PatternForm::Persistent, CommandOp::Enable)
            .await;
        let completed = sleep_cancellable(self.window.active(), &ctx.cancel).await;
        debug!("{} disable injection on nic {}", self.tag, self.interface);
        self.apply(ctx, PatternForm::Persistent, CommandOp::Disable)
            .await;
        if !completed {
            debug!("{} cancelled mid-window", self.tag);
        }
    }

    async fn run_burst(&self, ctx: &ControllerContext) {
        let Some((duration, period)) = burst_args(&self.pattern_args) else {
            error!(
                "{} burst doesn't have enough arguments to be defined",
                self.tag
            );
            return;
        };
        let bursts = (self.window.active / period.as_secs_f64()) as u64;
        info!(
            "fault {} starting burst injections, time: {}",
            self.tag, self.window.active
        );
        debug!(
            "burst config: duration {:?} period {:?} count {bursts}",
            duration, period
        );

        for _ in 0..bursts {
            self.apply(ctx, PatternForm::Persistent, CommandOp::Enable)
                .await;
            let completed = sleep_cancellable(duration, &ctx.cancel).await;
            self.apply(ctx, PatternForm::Persistent, CommandOp::Disable)
                .await;
            if !completed {
                return;
            }
            if !sleep_cancellable(period.saturating_sub(duration), &ctx.cancel).await {
                return;
            }
        }
    }

    async fn run_degradation(&self, ctx: &ControllerContext) {
        // Link degradation is percentage-based, so the end value caps at 100.
        let plan = DegradationPlan::from_args(&self.tag, &self.pattern_args, true);
        let steps = (self.window.active / plan.step.as_secs_f64()) as u64;
        let mut value = plan.start;

        info!(
            "fault {} starting degradation with {} per step",
            self.tag, plan.step_size
        );

        for step in 0..steps {
            // A step at the raw start value would render a no-op command, so
            // every step advances first and clamps at the end value.
            value = (value + plan.step_size).min(plan.end);
            debug!("{} #{step} step, intensity {value}", self.tag);
            self.apply(ctx, PatternForm::Random(value), CommandOp::Enable)
                .await;
            let completed = sleep_cancellable(plan.step, &ctx.cancel).await;
            self.apply(ctx, PatternForm::Random(value), CommandOp::Disable)
                .await;
            if !completed {
                return;
            }
        }
    }

    /// Renders and executes one enable or disable step, keeping the
    /// active-fault registry in sync. An empty rendering (unsupported or
    /// under-specified combination) performs no state change.
    async fn apply(&self, ctx: &ControllerContext, form: PatternForm, op: CommandOp) {
        let commands = render_link_commands(
            self.pid,
            &self.interface,
            self.fault,
            form,
            &self.type_args,
            &self.filter,
            op,
        );
        for command in &commands {
            debug!(
                "execute command in namespace for process {:?}: '{command}'",
                self.pid
            );
            let result = ctx.runner.run(command).await;
            match op {
                CommandOp::Enable => ctx.registry.set_active(
                    &self.tag,
                    self.fault.keyword(),
                    command,
                    result.retcode,
                ),
                CommandOp::Disable => ctx.registry.set_inactive(&self.tag),
            }
        }
    }
}
