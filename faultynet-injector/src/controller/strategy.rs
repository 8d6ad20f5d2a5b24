// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! The strategy interface. The three injecting policies (config-file,
//! random-links, most-used-link) and the log-only policy share the same
//! lifecycle; they differ only in how many iterations they run, how an
//! iteration is gated, and which injectors an iteration launches.

use crate::context::ControllerContext;
use crate::link::LinkInjector;
use crate::node::NodeInjector;
use async_trait::async_trait;
use faultynet_common::{
    FaultPattern, LinkFaultType, ResolvedLink, RunMode, TrafficFilter, Window,
};
use tracing::debug;

/// A configured injector, ready to drive its window.
pub enum FaultInstance {
    Link(LinkInjector),
    Node(NodeInjector),
}

impl FaultInstance {
    pub async fn run(&self, ctx: &ControllerContext) {
        match self {
            FaultInstance::Link(injector) => injector.run(ctx).await,
            FaultInstance::Node(injector) => injector.run(ctx).await,
        }
    }
}

#[async_trait]
pub trait InjectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn mode(&self) -> RunMode {
        RunMode::Automatic
    }

    /// Number of iterations of one full sequence.
    fn iteration_count(&self) -> usize;

    async fn do_iteration(&mut self, ctx: &ControllerContext, iteration: usize);

    /// Gate before each iteration: a no-op in automatic mode, otherwise
    /// blocks until `START_NEXT_RUN` arrives or the controller deactivates.
    /// Returns false on deactivation.
    async fn wait_for_next_run(&self, ctx: &ControllerContext) -> bool {
        match self.mode() {
            RunMode::Automatic => true,
            RunMode::Manual | RunMode::Repeating => {
                debug!("starting wait for run");
                let proceed = ctx.next_run.wait(&ctx.cancel).await;
                debug!("done waiting for run");
                proceed
            }
        }
    }

    /// The shared run template. Repeating mode loops the whole sequence
    /// until the controller deactivates.
    async fn run(&mut self, ctx: &ControllerContext) {
        loop {
            for iteration in 0..self.iteration_count() {
                if !self.wait_for_next_run(ctx).await {
                    break;
                }
                if !ctx.is_active() {
                    break;
                }
                self.do_iteration(ctx, iteration).await;
            }
            if self.mode() != RunMode::Repeating || !ctx.is_active() {
                break;
            }
        }
    }
}

/// Shared fault parameters of the link-selection strategies, parsed once
/// from the flat root keys of the configuration.
#[derive(Debug, Clone)]
pub struct SharedFaultSpec {
    pub fault: LinkFaultType,
    pub type_args: Vec<String>,
    pub pattern: FaultPattern,
    pub pattern_args: Vec<String>,
    pub injection_time: f64,
}

impl SharedFaultSpec {
    /// Both directions of a candidate link as link injectors with mirrored
    /// tags. Link-selection strategies always inject unfiltered traffic
    /// with a zero pre/post window.
    pub fn injectors_for_link(&self, link: &ResolvedLink) -> (LinkInjector, LinkInjector) {
        let (tag_a, tag_b) = link.tags();
        let make = |pid, interface: &String, tag: String| LinkInjector {
            pid,
            interface: interface.clone(),
            tag,
            fault: self.fault,
            filter: TrafficFilter::default(),
            type_args: self.type_args.clone(),
            pattern: self.pattern,
            pattern_args: self.pattern_args.clone(),
            window: Window {
                pre: 0.0,
                active: self.injection_time,
                post: 0.0,
            },
        };
        (
            make(link.a.pid, &link.a.interface, tag_a),
            make(link.b.pid, &link.b.interface, tag_b),
        )
    }
}
