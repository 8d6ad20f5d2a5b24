// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Per-process fault state machine. Node faults execute inside the target's
//! cgroup and namespaces (`nsenter --target <pid> --net --pid --all`);
//! CPU pressure is normalized against the target cgroup's CPU share so that
//! a requested percentage means "of this node", not "of the machine".

use crate::command::{nsenter_all, stress_cpu_command};
use crate::context::{sleep_cancellable, ControllerContext};
use crate::link::{burst_args, DegradationPlan};
use faultynet_common::{FaultPattern, NodeFaultType, Window};
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_STRESS_PERCENT: f64 = 50.0;

pub struct NodeInjector {
    pub pid: Option<i32>,
    pub tag: String,
    pub fault: NodeFaultType,
    pub fault_args: Vec<String>,
    pub pattern: FaultPattern,
    pub pattern_args: Vec<String>,
    pub window: Window,
}

impl NodeInjector {
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
        match self.fault {
            NodeFaultType::Custom => {
                let Some(start) = self.fault_args.first() else {
                    error!("{} doesn't have enough arguments", self.tag);
                    return;
                };
                let end = self.fault_args.get(1);
                self.execute(ctx, Some(start), true).await;
                sleep_cancellable(self.window.active(), &ctx.cancel).await;
                self.execute(ctx, end.map(String::as_str), false).await;
            }
            NodeFaultType::StressCpu => {
                let Some(fraction) = self.cgroup_fraction(ctx).await else {
                    return;
                };
                let command = stress_cpu_command(
                    self.stress_percent(),
                    fraction,
                    whole_seconds(self.window.active()),
                );
                self.execute(ctx, Some(&command), true).await;
                sleep_cancellable(self.window.active(), &ctx.cancel).await;
                // stress-ng runs for exactly the active window; the disable
                // is a bookkeeping step for the registry.
                self.execute(ctx, None, false).await;
            }
        }
    }

    async fn run_burst(&self, ctx: &ControllerContext) {
        let (duration, period) = match burst_args(&self.pattern_args) {
            Some(args) => args,
            None => {
                error!(
                    "{} burst is missing parameters, defaulting to 1 second per 2 seconds",
                    self.tag
                );
                (Duration::from_secs(1), Duration::from_secs(2))
            }
        };
        let bursts = (self.window.active / period.as_secs_f64()) as u64;

        match self.fault {
            NodeFaultType::Custom => {
                let Some(start) = self.fault_args.first().cloned() else {
                    error!("{} missing fault args for injection", self.tag);
                    return;
                };
                let end = self.fault_args.get(1).cloned();
                for _ in 0..bursts {
                    self.execute(ctx, Some(&start), true).await;
                    let completed = sleep_cancellable(duration, &ctx.cancel).await;
                    self.execute(ctx, end.as_deref(), false).await;
                    if !completed {
                        return;
                    }
                    if !sleep_cancellable(period.saturating_sub(duration), &ctx.cancel).await {
                        return;
                    }
                }
            }
            NodeFaultType::StressCpu => {
                // stress-ng rejects intervals below one second.
                let stress_duration = whole_seconds(duration).max(1);
                let Some(fraction) = self.cgroup_fraction(ctx).await else {
                    return;
                };
                let command =
                    stress_cpu_command(self.stress_percent(), fraction, stress_duration);
                for _ in 0..bursts {
                    self.execute(ctx, Some(&command), true).await;
                    let completed = sleep_cancellable(duration, &ctx.cancel).await;
                    self.execute(ctx, None, false).await;
                    if !completed {
                        return;
                    }
                    if !sleep_cancellable(period.saturating_sub(duration), &ctx.cancel).await {
                        return;
                    }
                }
            }
        }
    }

    async fn run_degradation(&self, ctx: &ControllerContext) {
        // Custom degradation values are caller-defined, not percentages, so
        // only stress degradation caps at 100.
        let clamp_percent = self.fault == NodeFaultType::StressCpu;
        let plan = DegradationPlan::from_args(&self.tag, &self.pattern_args, clamp_percent);
        let steps = (self.window.active / plan.step.as_secs_f64()) as u64;
        let mut value = plan.start;

        match self.fault {
            NodeFaultType::Custom => {
                let Some(start_template) = self.fault_args.first().cloned() else {
                    error!("{} missing fault args for injection", self.tag);
                    return;
                };
                let end = self.fault_args.get(1).cloned();
                if start_template.matches("{}").count() > 1 {
                    error!(
                        "{} contains more than one place to insert arguments, \
                         but currently only supports one",
                        self.tag
                    );
                    return;
                }
                for _ in 0..steps {
                    value = (value + plan.step_size).min(plan.end);
                    let start = start_template.replacen("{}", &value.to_string(), 1);
                    self.execute(ctx, Some(&start), true).await;
                    let completed = sleep_cancellable(plan.step, &ctx.cancel).await;
                    self.execute(ctx, end.as_deref(), false).await;
                    if !completed {
                        return;
                    }
                }
            }
            NodeFaultType::StressCpu => {
                let Some(fraction) = self.cgroup_fraction(ctx).await else {
                    return;
                };
                let step_duration = whole_seconds(plan.step).max(1);
                for _ in 0..steps {
                    value = (value + plan.step_size).min(plan.end);
                    let command = stress_cpu_command(value as f64, fraction, step_duration);
                    self.execute(ctx, Some(&command), true).await;
                    let completed = sleep_cancellable(plan.step, &ctx.cancel).await;
                    self.execute(ctx, None, false).await;
                    if !completed {
                        return;
                    }
                }
            }
        }
    }

    fn stress_percent(&self) -> f64 {
        match self.fault_args.first().and_then(|a| a.parse().ok()) {
            Some(percent) => percent,
            None => {
                error!(
                    "{} doesn't define stress intensity, defaulting to {DEFAULT_STRESS_PERCENT}%",
                    self.tag
                );
                DEFAULT_STRESS_PERCENT
            }
        }
    }

    /// `cpu.cfs_quota_us / cpu.cfs_period_us` of the target's cgroup: the
    /// node's share of a CPU. Requested stress percentages are scaled by
    /// this before being handed to stress-ng, which takes machine-global
    /// loads.
    async fn cgroup_fraction(&self, ctx: &ControllerContext) -> Option<f64> {
        let Some(pid) = self.pid else {
            error!("can't access cgroup information for fault {}: no pid", self.tag);
            return None;
        };
        let cgroups = ctx.runner.run(&format!("cat /proc/{pid}/cgroup")).await;
        if cgroups.retcode != 0 {
            error!("can't access cgroup information for fault {}", self.tag);
            return None;
        }
        let Some(name) = cpu_cgroup_name(&cgroups.output) else {
            error!("can't access cgroup information for fault {}", self.tag);
            return None;
        };
        debug!("cgroup for pid {pid}: {name}");

        let details = ctx.runner.run(&format!("cgget -g cpu {name}")).await;
        if details.retcode != 0 {
            error!("tried to find cgroup size for {name}, but couldn't find it");
            return None;
        }
        let fraction = cgroup_cpu_fraction(&details.output);
        if fraction.is_none() {
            error!("tried to find cgroup size for {name}, but couldn't find it");
        }
        fraction
    }

    /// Runs the command inside all of the node's namespaces. `None` performs
    /// no invocation but still keeps the registry in sync, which is how
    /// backgrounded stress runs are accounted for.
    async fn execute(&self, ctx: &ControllerContext, command: Option<&str>, enable: bool) {
        let Some(command) = command else {
            if enable {
                ctx.registry.set_active(
                    &self.tag,
                    self.fault.keyword(),
                    "Dummy command, no action taken",
                    0,
                );
            } else {
                ctx.registry.set_inactive(&self.tag);
            }
            return;
        };

        let full_command = nsenter_all(self.pid, command);
        let result = ctx.runner.run(&full_command).await;
        if enable {
            ctx.registry
                .set_active(&self.tag, self.fault.keyword(), command, result.retcode);
        } else {
            ctx.registry.set_inactive(&self.tag);
        }
    }
}

/// Extracts the `cpu,cpuacct` controller's cgroup name from the contents of
/// `/proc/<pid>/cgroup` (`<id>:cpu,cpuacct:/<name>` lines).
fn cpu_cgroup_name(cgroup_file: &str) -> Option<String> {
    for line in cgroup_file.lines() {
        let mut fields = line.splitn(3, ':');
        let _id = fields.next()?;
        let controllers = fields.next()?;
        let path = fields.next()?;
        if controllers.split(',').any(|c| c == "cpu" || c == "cpuacct") {
            return Some(path.strip_prefix('/').unwrap_or(path).to_string());
        }
    }
    None
}

/// Parses `cpu.cfs_period_us` and `cpu.cfs_quota_us` out of `cgget -g cpu`
/// output and returns quota/period.
fn cgroup_cpu_fraction(cgget_output: &str) -> Option<f64> {
    let mut period: Option<f64> = None;
    let mut quota: Option<f64> = None;
    for line in cgget_output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("cpu.cfs_period_us:") {
            period = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("cpu.cfs_quota_us:") {
            quota = value.trim().parse().ok();
        }
    }
    match (quota, period) {
        (Some(quota), Some(period)) if period > 0.0 && quota > 0.0 => Some(quota / period),
        _ => None,
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs()
}
