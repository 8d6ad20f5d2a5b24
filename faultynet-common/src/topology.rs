// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Read-only snapshot of the emulated topology, handed over by the emulator
//! when a starter is constructed. The fault controller core never mutates it
//! and never sees it from inside the injector process.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Host,
    Switch,
    Controller,
}

/// A node of the emulated network. `pid` is the process whose network
/// namespace commands must be entered through; switches running in the host
/// root namespace carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub label: String,
    pub pid: Option<i32>,
    pub kind: NodeKind,
}

/// One side of a link: the owning node's label plus the interface name on
/// that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub interface: String,
}

/// An unordered pair of endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub endpoints: [Endpoint; 2],
}

impl Link {
    /// Returns the endpoint sitting on `node`, if any.
    pub fn endpoint_of(&self, node: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.node == node)
    }

    /// True if the link connects exactly the two given nodes, in either
    /// orientation.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        let [e1, e2] = &self.endpoints;
        (e1.node == a && e2.node == b) || (e1.node == b && e2.node == a)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl TopologySnapshot {
    pub fn node(&self, label: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.label == label)
    }

    /// Hosts only. Identifier resolution scans hosts first; switches are
    /// assumed to live in the host root namespace.
    pub fn host(&self, label: &str) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::Host && n.label == label)
    }

    pub fn pid_of(&self, label: &str) -> Option<i32> {
        self.node(label).and_then(|n| n.pid)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn star() -> TopologySnapshot {
        let host = |label: &str, pid: i32| Node {
            label: label.into(),
            pid: Some(pid),
            kind: NodeKind::Host,
        };
        let link = |a: &str, ifa: &str, b: &str, ifb: &str| Link {
            endpoints: [
                Endpoint {
                    node: a.into(),
                    interface: ifa.into(),
                },
                Endpoint {
                    node: b.into(),
                    interface: ifb.into(),
                },
            ],
        };
        TopologySnapshot {
            nodes: vec![
                host("h1", 101),
                host("h2", 102),
                host("h3", 103),
                Node {
                    label: "s1".into(),
                    pid: None,
                    kind: NodeKind::Switch,
                },
            ],
            links: vec![
                link("h1", "h1-eth0", "s1", "s1-eth1"),
                link("h2", "h2-eth0", "s1", "s1-eth2"),
                link("h3", "h3-eth0", "s1", "s1-eth3"),
            ],
        }
    }

    #[test]
    fn connects_is_orientation_agnostic() {
        let topo = star();
        assert!(topo.links[0].connects("h1", "s1"));
        assert!(topo.links[0].connects("s1", "h1"));
        assert!(!topo.links[0].connects("h1", "h2"));
    }

    #[test]
    fn endpoint_lookup_picks_the_right_side() {
        let topo = star();
        assert_eq!(
            topo.links[2].endpoint_of("s1").map(|e| e.interface.as_str()),
            Some("s1-eth3")
        );
        assert_eq!(topo.links[2].endpoint_of("h1"), None);
    }

    #[test]
    fn host_scan_skips_switches() {
        let topo = star();
        assert!(topo.host("h2").is_some());
        assert!(topo.host("s1").is_none());
        assert!(topo.node("s1").is_some());
    }
}
