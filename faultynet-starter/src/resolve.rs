// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Turns a user configuration into the injector-ready resolved form: every
//! symbolic identifier becomes a `(pid, interface, label)` triple, redirect
//! destinations become concrete interface names, the candidate-link list is
//! enumerated for the link-selection strategies, and diagnostic log
//! commands get tags and namespace pids. After this pass the injector never
//! needs the topology snapshot.

use faultynet_common::identifier::{self, Identifier};
use faultynet_common::{Config, FaultSpec, LinkEnd, ResolvedLink, StrategyKind, TopologySnapshot};
use tracing::{debug, warn};
use uuid::Uuid;

pub fn prepare(config: &mut Config, topology: &TopologySnapshot) {
    match config.strategy() {
        StrategyKind::ConfigFile => resolve_fault_list(config, topology),
        StrategyKind::RandomLinks | StrategyKind::MostUsedLink => {
            config.links = candidate_links(topology, &config.nodes_blacklist);
        }
        StrategyKind::LogOnly => {}
    }
    resolve_log_commands(config, topology);
}

fn resolve_fault_list(config: &mut Config, topology: &TopologySnapshot) {
    for entry in &mut config.faults {
        let Some(spec) = entry.spec_mut() else {
            continue;
        };
        if spec.tag.is_none() {
            spec.tag = Some(Uuid::new_v4().to_string());
        }
        if !rewrite_redirect_destination(spec, topology) {
            // An unresolvable redirect destination would end up inside the
            // rendered command; drop the spec instead.
            spec.resolved = Vec::new();
            continue;
        }
        spec.resolved = spec
            .identifiers
            .iter()
            .map(|identifier| identifier::resolve(topology, identifier))
            .collect();
    }
}

/// For redirect faults, `type_args[0]` may itself be an identifier in arrow
/// form naming the destination interface. Returns false when it cannot be
/// resolved.
fn rewrite_redirect_destination(spec: &mut FaultSpec, topology: &TopologySnapshot) -> bool {
    if spec.fault_type.as_deref() != Some("link_fault:redirect") {
        return true;
    }
    let Some(destination) = spec.type_args.first().cloned() else {
        return true;
    };
    if !matches!(Identifier::parse(&destination), Identifier::Link { .. }) {
        // Already a literal interface name.
        return true;
    }
    match identifier::resolve(topology, &destination).interface {
        Some(interface) => {
            debug!("redirect destination '{destination}' resolved to {interface}");
            spec.type_args[0] = interface;
            true
        }
        None => {
            warn!("redirect destination '{destination}' could not be resolved, skipping fault");
            false
        }
    }
}

/// All links not touching a blacklisted node, with both endpoints resolved.
fn candidate_links(topology: &TopologySnapshot, blacklist: &[String]) -> Vec<ResolvedLink> {
    topology
        .links
        .iter()
        .filter_map(|link| {
            let [e1, e2] = &link.endpoints;
            if blacklist.contains(&e1.node) || blacklist.contains(&e2.node) {
                // Links touching a blacklisted node can never carry faults.
                return None;
            }
            Some(ResolvedLink {
                a: LinkEnd {
                    pid: topology.pid_of(&e1.node),
                    interface: e1.interface.clone(),
                    node: e1.node.clone(),
                },
                b: LinkEnd {
                    pid: topology.pid_of(&e2.node),
                    interface: e2.interface.clone(),
                    node: e2.node.clone(),
                },
            })
        })
        .collect()
}

fn resolve_log_commands(config: &mut Config, topology: &TopologySnapshot) {
    let Some(log) = &mut config.log else {
        return;
    };
    for command in &mut log.commands {
        if command.tag.is_none() {
            command.tag = Some(Uuid::new_v4().to_string());
        }
        command.host_pid = identifier::resolve_host_pid(topology, command.host.as_deref());
    }
}
