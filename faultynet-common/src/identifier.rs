// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Symbolic target identifiers and their resolution against a topology
//! snapshot.
//!
//! Identifiers come in three forms: `h1` (node), `h1->s1` (any link between
//! the two nodes, taken from h1's side) and `h1->s1:eth0` (the link whose
//! interface on h1 is literally `eth0`). Resolution happens in the starter;
//! the injector process only ever sees the resolved `(pid, interface, label)`
//! triples.

use crate::topology::TopologySnapshot;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A parsed identifier, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Node(String),
    Link {
        a: String,
        b: String,
        interface: Option<String>,
    },
}

impl Identifier {
    /// Anything without an arrow is a node name; `a->b` and `a->b:if` are
    /// link forms. Interface lookup is case-sensitive and does no globbing.
    pub fn parse(input: &str) -> Identifier {
        match input.split_once("->") {
            None => Identifier::Node(input.to_string()),
            Some((a, rest)) => match rest.split_once(':') {
                None => Identifier::Link {
                    a: a.to_string(),
                    b: rest.to_string(),
                    interface: None,
                },
                Some((b, interface)) => Identifier::Link {
                    a: a.to_string(),
                    b: b.to_string(),
                    interface: Some(interface.to_string()),
                },
            },
        }
    }
}

/// The `(pid_or_nil, ifname_or_nil, label)` triple passed across the process
/// boundary. `pid` of `None` means the host root namespace; `interface` is
/// `None` for node-scoped targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub pid: Option<i32>,
    pub interface: Option<String>,
    pub label: String,
}

impl ResolvedTarget {
    /// A resolution miss: nothing matched, both handles are nil.
    pub fn is_miss(&self) -> bool {
        self.pid.is_none() && self.interface.is_none()
    }
}

/// Resolves a symbolic identifier against the snapshot.
///
/// Node form: hosts are scanned by label; a miss is still a valid resolution
/// to the root namespace, since switches usually run there. Link form: the
/// first link connecting both nodes wins, taking the interface on the first
/// node's side; when an explicit interface is given the search continues
/// until it matches exactly. A link miss yields `(nil, nil, input)` and a
/// warning.
pub fn resolve(topology: &TopologySnapshot, input: &str) -> ResolvedTarget {
    match Identifier::parse(input) {
        Identifier::Node(label) => {
            let pid = topology.host(&label).and_then(|n| n.pid);
            ResolvedTarget {
                pid,
                interface: None,
                label,
            }
        }
        Identifier::Link { a, b, interface } => {
            for link in &topology.links {
                if !link.connects(&a, &b) {
                    continue;
                }
                let Some(endpoint) = link.endpoint_of(&a) else {
                    continue;
                };
                if let Some(wanted) = &interface {
                    if &endpoint.interface != wanted {
                        continue;
                    }
                }
                return ResolvedTarget {
                    pid: topology.pid_of(&a),
                    interface: Some(endpoint.interface.clone()),
                    label: input.to_string(),
                };
            }
            match &interface {
                Some(name) => warn!(
                    "couldn't find interface {name} between {a} and {b}, are all names correct?"
                ),
                None => {
                    warn!("couldn't find a fitting interface between {a} and {b}, are both names correct?")
                }
            }
            ResolvedTarget {
                pid: None,
                interface: None,
                label: input.to_string(),
            }
        }
    }
}

/// Resolves the optional `host` of a diagnostic log command into a pid.
/// `None` (or a node without its own namespace) falls back to the root
/// namespace.
pub fn resolve_host_pid(topology: &TopologySnapshot, host: Option<&str>) -> Option<i32> {
    host.and_then(|label| resolve(topology, label).pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::star;

    #[test]
    fn parses_all_three_forms() {
        assert_eq!(Identifier::parse("h1"), Identifier::Node("h1".into()));
        assert_eq!(
            Identifier::parse("h1->s1"),
            Identifier::Link {
                a: "h1".into(),
                b: "s1".into(),
                interface: None
            }
        );
        assert_eq!(
            Identifier::parse("h1->s1:h1-eth0"),
            Identifier::Link {
                a: "h1".into(),
                b: "s1".into(),
                interface: Some("h1-eth0".into())
            }
        );
    }

    #[test]
    fn resolves_node_form_to_host_pid() {
        let target = resolve(&star(), "h2");
        assert_eq!(target.pid, Some(102));
        assert_eq!(target.interface, None);
        assert_eq!(target.label, "h2");
    }

    #[test]
    fn unknown_node_falls_back_to_root_namespace() {
        // Switches are not hosts; they resolve to the root namespace.
        let target = resolve(&star(), "s1");
        assert!(target.is_miss());
        assert_eq!(target.label, "s1");
    }

    #[test]
    fn resolves_link_form_from_the_first_nodes_side() {
        let target = resolve(&star(), "h1->s1");
        assert_eq!(target.pid, Some(101));
        assert_eq!(target.interface.as_deref(), Some("h1-eth0"));

        let reverse = resolve(&star(), "s1->h3");
        assert_eq!(reverse.pid, None);
        assert_eq!(reverse.interface.as_deref(), Some("s1-eth3"));
    }

    #[test]
    fn explicit_interface_must_match_exactly() {
        let hit = resolve(&star(), "h1->s1:h1-eth0");
        assert_eq!(hit.interface.as_deref(), Some("h1-eth0"));

        let miss = resolve(&star(), "h1->s1:h1-eth9");
        assert!(miss.is_miss());
        assert_eq!(miss.label, "h1->s1:h1-eth9");
    }

    #[test]
    fn link_between_unconnected_nodes_is_a_miss() {
        let miss = resolve(&star(), "h1->h2");
        assert!(miss.is_miss());
    }

    #[test]
    fn log_command_hosts_resolve_to_pids() {
        assert_eq!(resolve_host_pid(&star(), Some("h3")), Some(103));
        assert_eq!(resolve_host_pid(&star(), None), None);
        assert_eq!(resolve_host_pid(&star(), Some("s1")), None);
    }
}
