// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! The config-file strategy: an explicit list of fault specs, each expanded
//! into one injector per resolved identifier, all launched concurrently.

use crate::context::ControllerContext;
use crate::controller::strategy::{FaultInstance, InjectionStrategy};
use crate::link::LinkInjector;
use crate::node::NodeInjector;
use async_trait::async_trait;
use faultynet_common::{
    parse_fault_type, Config, FaultSpec, ParsedFaultType, ResolvedTarget, TrafficFilter,
};
use futures::future::join_all;
use tracing::{debug, error, warn};

#[derive(Default)]
pub struct ConfigFileStrategy {
    faults: Vec<FaultInstance>,
}

impl ConfigFileStrategy {
    pub fn from_config(config: &Config) -> ConfigFileStrategy {
        let mut faults = Vec::new();
        for (index, entry) in config.faults.iter().enumerate() {
            let Some(spec) = entry.spec() else {
                warn!("fault entry #{index} has no link_fault or node_fault key");
                continue;
            };
            let Some(type_value) = spec.fault_type.as_deref() else {
                warn!("no fault type set");
                continue;
            };
            let parsed = match parse_fault_type(type_value) {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!("fault type unknown: '{type_value}'");
                    continue;
                }
            };
            let base_tag = spec
                .tag
                .clone()
                .unwrap_or_else(|| format!("fault-{index}"));
            for target in &spec.resolved {
                if let Some(instance) = instance_for_target(spec, parsed, target, &base_tag) {
                    faults.push(instance);
                }
            }
        }
        ConfigFileStrategy { faults }
    }

    #[cfg(test)]
    pub fn fault_count(&self) -> usize {
        self.faults.len()
    }
}

fn instance_for_target(
    spec: &FaultSpec,
    parsed: ParsedFaultType,
    target: &ResolvedTarget,
    base_tag: &str,
) -> Option<FaultInstance> {
    let tag = format!("{base_tag}@{}", target.label);
    match parsed {
        ParsedFaultType::Link(fault) => {
            let Some(interface) = target.interface.clone() else {
                warn!(
                    "identifier '{}' resolved to no interface, skipping fault",
                    target.label
                );
                return None;
            };
            let filter = match TrafficFilter::from_target(spec.target_traffic.as_ref()) {
                Ok(filter) => filter,
                Err(err) => {
                    error!("{err}, injecting any instead");
                    TrafficFilter::default()
                }
            };
            Some(FaultInstance::Link(LinkInjector {
                pid: target.pid,
                interface,
                tag,
                fault,
                filter,
                type_args: spec.type_args.clone(),
                pattern: spec.pattern,
                pattern_args: spec.pattern_args.clone(),
                window: spec.window(),
            }))
        }
        ParsedFaultType::Node(fault) => Some(FaultInstance::Node(NodeInjector {
            pid: target.pid,
            tag,
            fault,
            fault_args: spec.type_args.clone(),
            pattern: spec.pattern,
            pattern_args: spec.pattern_args.clone(),
            window: spec.window(),
        })),
    }
}

#[async_trait]
impl InjectionStrategy for ConfigFileStrategy {
    fn name(&self) -> &'static str {
        "config_file"
    }

    fn iteration_count(&self) -> usize {
        1
    }

    async fn do_iteration(&mut self, ctx: &ControllerContext, _iteration: usize) {
        debug!("all faults scheduled");
        join_all(self.faults.iter().map(|fault| fault.run(ctx))).await;
    }
}
