// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Configuration model shared by the starter and the injector process.
//!
//! The user writes YAML; the starter resolves all symbolic identifiers and
//! hands the same structure, now carrying resolved targets and candidate
//! links, to the injector as JSON. Re-parsing on the injector side yields the
//! same in-memory configuration.

use crate::identifier::ResolvedTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable through which the starter hands the resolved
/// configuration JSON to the injector process.
pub const ENV_INJECTOR_CONFIG: &str = "FAULTYNET_INJECTOR_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed resolved config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown fault type: '{0}'")]
    UnknownFaultType(String),
    #[error("unknown protocol: '{0}'")]
    UnknownProtocol(String),
}

/// Which controller policy drives the injection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ConfigFile,
    RandomLinks,
    MostUsedLink,
    LogOnly,
}

/// Iteration gating for the random/most-used strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Automatic,
    Manual,
    Repeating,
}

/// Temporal shape of a fault within its active window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPattern {
    #[default]
    Persistent,
    Burst,
    Degradation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Link,
    Node,
}

/// Link-scoped fault types. Everything except `Down` and `Redirect` maps to
/// a `tc` qdisc keyword (`netem` family or `tbf` for `Bottleneck`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFaultType {
    Delay,
    Loss,
    Corrupt,
    Duplicate,
    Reorder,
    Rate,
    Limit,
    Slot,
    Bottleneck,
    Down,
    Redirect,
}

impl LinkFaultType {
    pub fn keyword(self) -> &'static str {
        match self {
            LinkFaultType::Delay => "delay",
            LinkFaultType::Loss => "loss",
            LinkFaultType::Corrupt => "corrupt",
            LinkFaultType::Duplicate => "duplicate",
            LinkFaultType::Reorder => "reorder",
            LinkFaultType::Rate => "rate",
            LinkFaultType::Limit => "limit",
            LinkFaultType::Slot => "slot",
            LinkFaultType::Bottleneck => "bottleneck",
            LinkFaultType::Down => "down",
            LinkFaultType::Redirect => "redirect",
        }
    }

}

impl fmt::Display for LinkFaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeFaultType {
    StressCpu,
    Custom,
}

impl NodeFaultType {
    pub fn keyword(self) -> &'static str {
        match self {
            NodeFaultType::StressCpu => "stress_cpu",
            NodeFaultType::Custom => "custom",
        }
    }
}

impl fmt::Display for NodeFaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedFaultType {
    Link(LinkFaultType),
    Node(NodeFaultType),
}

/// Parses the `type:` value of a fault spec, e.g. `link_fault:loss` or
/// `node_fault:stress_cpu`.
pub fn parse_fault_type(value: &str) -> Result<ParsedFaultType, ConfigError> {
    if let Some(name) = value.strip_prefix("link_fault:") {
        let fault = match name {
            "delay" => LinkFaultType::Delay,
            "loss" => LinkFaultType::Loss,
            "corrupt" => LinkFaultType::Corrupt,
            "duplicate" => LinkFaultType::Duplicate,
            "reorder" => LinkFaultType::Reorder,
            "rate" => LinkFaultType::Rate,
            "limit" => LinkFaultType::Limit,
            "slot" => LinkFaultType::Slot,
            "bottleneck" => LinkFaultType::Bottleneck,
            "down" => LinkFaultType::Down,
            "redirect" => LinkFaultType::Redirect,
            _ => return Err(ConfigError::UnknownFaultType(value.to_string())),
        };
        return Ok(ParsedFaultType::Link(fault));
    }
    if let Some(name) = value.strip_prefix("node_fault:") {
        let fault = match name {
            "stress_cpu" => NodeFaultType::StressCpu,
            "custom" => NodeFaultType::Custom,
            _ => return Err(ConfigError::UnknownFaultType(value.to_string())),
        };
        return Ok(ParsedFaultType::Node(fault));
    }
    Err(ConfigError::UnknownFaultType(value.to_string()))
}

/// Traffic selector protocols, numbered per IANA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "ICMP")]
    Icmp,
    #[serde(rename = "IGMP")]
    Igmp,
    #[serde(rename = "IP")]
    Ip,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    #[serde(rename = "IPv6")]
    Ipv6,
    #[serde(rename = "IPv6-ICMP")]
    Ipv6Icmp,
}

impl Protocol {
    pub fn parse(name: &str) -> Result<Protocol, ConfigError> {
        Ok(match name {
            "any" => Protocol::Any,
            "ICMP" => Protocol::Icmp,
            "IGMP" => Protocol::Igmp,
            "IP" => Protocol::Ip,
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            "IPv6" => Protocol::Ipv6,
            "IPv6-ICMP" => Protocol::Ipv6Icmp,
            other => return Err(ConfigError::UnknownProtocol(other.to_string())),
        })
    }

    /// IANA protocol number, `None` for `any`.
    pub fn number(self) -> Option<u8> {
        match self {
            Protocol::Any => None,
            Protocol::Icmp => Some(1),
            Protocol::Igmp => Some(2),
            Protocol::Ip => Some(4),
            Protocol::Tcp => Some(6),
            Protocol::Udp => Some(17),
            Protocol::Ipv6 => Some(41),
            Protocol::Ipv6Icmp => Some(58),
        }
    }
}

/// Raw `target_traffic:` object as it appears in YAML. Ports of 0 mean
/// "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTraffic {
    pub protocol: Option<String>,
    #[serde(default)]
    pub src_port: u16,
    #[serde(default)]
    pub dst_port: u16,
}

/// Normalized traffic filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficFilter {
    pub protocol: Protocol,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl TrafficFilter {
    /// Normalizes the raw YAML object. An unknown protocol is reported
    /// through the returned error but callers are expected to degrade to
    /// `any` and continue.
    pub fn from_target(target: Option<&TargetTraffic>) -> Result<TrafficFilter, ConfigError> {
        let Some(target) = target else {
            return Ok(TrafficFilter::default());
        };
        let protocol = match &target.protocol {
            None => Protocol::Any,
            Some(name) => Protocol::parse(name)?,
        };
        Ok(TrafficFilter {
            protocol,
            src_port: (target.src_port != 0).then_some(target.src_port),
            dst_port: (target.dst_port != 0).then_some(target.dst_port),
        })
    }

    pub fn is_any(&self) -> bool {
        self.protocol == Protocol::Any
    }
}

/// The `(pre, active, post)` window bracketing a fault's life, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Window {
    pub pre: f64,
    pub active: f64,
    pub post: f64,
}

impl Window {
    pub fn pre(&self) -> Duration {
        Duration::from_secs_f64(self.pre.max(0.0))
    }

    pub fn active(&self) -> Duration {
        Duration::from_secs_f64(self.active.max(0.0))
    }

    pub fn post(&self) -> Duration {
        Duration::from_secs_f64(self.post.max(0.0))
    }
}

/// One fault description, the value under a `link_fault:` or `node_fault:`
/// key. `type` keeps the `link_fault:<t>` / `node_fault:<t>` prefix form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultSpec {
    #[serde(rename = "type")]
    pub fault_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<String>,
    #[serde(default)]
    pub pattern: FaultPattern,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pattern_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    /// Filled by the starter; the injector never sees symbolic identifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved: Vec<ResolvedTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_traffic: Option<TargetTraffic>,
    #[serde(default)]
    pub pre_injection_time: f64,
    #[serde(default)]
    pub injection_time: f64,
    #[serde(default)]
    pub post_injection_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl FaultSpec {
    pub fn window(&self) -> Window {
        Window {
            pre: self.pre_injection_time,
            active: self.injection_time,
            post: self.post_injection_time,
        }
    }
}

/// A `faults:` list item: a map with a single `link_fault` or `node_fault`
/// key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_fault: Option<FaultSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_fault: Option<FaultSpec>,
}

impl FaultEntry {
    pub fn kind(&self) -> Option<FaultKind> {
        match (&self.link_fault, &self.node_fault) {
            (Some(_), _) => Some(FaultKind::Link),
            (None, Some(_)) => Some(FaultKind::Node),
            (None, None) => None,
        }
    }

    pub fn spec(&self) -> Option<&FaultSpec> {
        self.link_fault.as_ref().or(self.node_fault.as_ref())
    }

    pub fn spec_mut(&mut self) -> Option<&mut FaultSpec> {
        self.link_fault.as_mut().or(self.node_fault.as_mut())
    }
}

/// One side of a resolved candidate link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEnd {
    pub pid: Option<i32>,
    pub interface: String,
    pub node: String,
}

/// Both directions of a candidate link, as enumerated by the starter for the
/// random/most-used strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLink {
    pub a: LinkEnd,
    pub b: LinkEnd,
}

impl ResolvedLink {
    /// Mirrored injection tags, `A:ifA->B:ifB` and `B:ifB->A:ifA`.
    pub fn tags(&self) -> (String, String) {
        (
            format!(
                "{}:{}->{}:{}",
                self.a.node, self.a.interface, self.b.node, self.b.interface
            ),
            format!(
                "{}:{}->{}:{}",
                self.b.node, self.b.interface, self.a.node, self.a.interface
            ),
        )
    }
}

/// A diagnostic command sampled by the fault logger. `host` is resolved by
/// the starter into `host_pid`; `None` runs in the root namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_pid: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Sampling interval in milliseconds; defaults to 1000.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<LogCommand>,
}

/// Root configuration object. `faults:` drives the config-file strategy; the
/// flat `fault_type`/`start_links`/… keys drive the random and most-used
/// strategies; `links` is injected by the starter and never written by the
/// user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<StrategyKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<FaultEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<FaultPattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pattern_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_links: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_links: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RunMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes_blacklist: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_traffic: Option<TargetTraffic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<ResolvedLink>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn from_json(json: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The selected strategy: the explicit `controller:` key, else
    /// config-file when a `faults:` list is present, else log-only.
    pub fn strategy(&self) -> StrategyKind {
        if let Some(kind) = self.controller {
            return kind;
        }
        if !self.faults.is_empty() {
            StrategyKind::ConfigFile
        } else if self.fault_type.is_some() {
            StrategyKind::RandomLinks
        } else {
            StrategyKind::LogOnly
        }
    }
}
