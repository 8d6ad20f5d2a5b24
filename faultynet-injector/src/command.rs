// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Pure rendering of the shell commands that install and remove faults.
//!
//! Every function here is free of side effects; the injectors decide when to
//! run what. Commands enter the target's network namespace with
//! `nsenter --target <pid> --net` unless the target lives in the host root
//! namespace (`pid` of `None`).

use faultynet_common::{LinkFaultType, TrafficFilter};
use tracing::error;

/// Whether a command sequence installs or removes a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOp {
    Enable,
    Disable,
}

impl CommandOp {
    fn tc_word(self) -> &'static str {
        match self {
            CommandOp::Enable => "add",
            CommandOp::Disable => "del",
        }
    }
}

/// The command form the pattern loop asks for: the persistent form pins the
/// fault at full strength, the random form carries the current intensity
/// value of a degradation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternForm {
    Persistent,
    Random(i64),
}

fn tc_base(pid: Option<i32>) -> String {
    match pid {
        Some(pid) => format!("nsenter --target {pid} --net tc"),
        None => "tc".to_string(),
    }
}

fn ns_prefix(pid: Option<i32>) -> String {
    match pid {
        Some(pid) => format!("nsenter --target {pid} --net "),
        None => String::new(),
    }
}

/// Base invocation for node-scoped commands, entering all of the target's
/// namespaces.
pub fn nsenter_all(pid: Option<i32>, command: &str) -> String {
    match pid {
        Some(pid) => format!("nsenter --target {pid} --net --pid --all {command}"),
        None => command.to_string(),
    }
}

/// `stress-ng` invocation for a cgroup-normalized CPU load, backgrounded so
/// the scheduler is never blocked. decimal64 tracks the requested usage much
/// closer than e.g. the euler method.
pub fn stress_cpu_command(requested_percent: f64, cgroup_fraction: f64, duration_secs: u64) -> String {
    let load = (requested_percent * cgroup_fraction).round() as i64;
    format!("stress-ng -l {load} -t {duration_secs} --cpu 1 --cpu-method decimal64&")
}

fn redirect_mode(type_args: &[String]) -> &str {
    match type_args.get(1).map(String::as_str) {
        Some("mirror") => "mirror",
        _ => "redirect",
    }
}

/// Renders the command sequence for one enable or disable step of a link
/// fault. An empty sequence means the combination is unsupported or
/// under-specified; the caller performs no state change for it.
pub fn render_link_commands(
    pid: Option<i32>,
    device: &str,
    fault: LinkFaultType,
    form: PatternForm,
    type_args: &[String],
    filter: &TrafficFilter,
    op: CommandOp,
) -> Vec<String> {
    // Interface down is an ifconfig toggle; a traffic filter cannot apply.
    if fault == LinkFaultType::Down {
        let state = match op {
            CommandOp::Enable => "down",
            CommandOp::Disable => "up",
        };
        return vec![format!("{}ifconfig {device} {state}", ns_prefix(pid))];
    }

    if matches!(form, PatternForm::Random(_)) && fault == LinkFaultType::Redirect {
        error!("trying to inject a redirect fault with randomness, this is not supported");
        return Vec::new();
    }

    if filter.is_any() || filter.protocol.number().is_none() {
        render_unfiltered(pid, device, fault, form, type_args, op)
    } else {
        render_filtered(pid, device, fault, form, type_args, filter, op)
    }
}

fn netem_argument(fault: LinkFaultType, form: PatternForm, type_args: &[String]) -> Option<String> {
    match form {
        PatternForm::Persistent => {
            if fault == LinkFaultType::Delay {
                match type_args.first() {
                    Some(arg) => Some(arg.clone()),
                    None => {
                        error!("delay fault is missing its latency argument");
                        None
                    }
                }
            } else {
                Some(
                    type_args
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "100%".to_string()),
                )
            }
        }
        PatternForm::Random(value) => {
            if fault == LinkFaultType::Delay {
                // e.g. netem delay 50ms reorder 50%
                match type_args.first() {
                    Some(arg) => Some(format!("{arg} reorder {}%", 100 - value)),
                    None => {
                        error!("delay fault is missing its latency argument");
                        None
                    }
                }
            } else {
                Some(format!("{value}%"))
            }
        }
    }
}

fn tbf_arguments(type_args: &[String]) -> Option<String> {
    let Some(rate) = type_args.first() else {
        error!("bottleneck fault is missing its rate argument");
        return None;
    };
    let burst = type_args.get(1).map(String::as_str).unwrap_or("1600");
    let limit = type_args.get(2).map(String::as_str).unwrap_or("3000");
    Some(format!("rate {rate}kbit burst {burst} limit {limit}"))
}

fn render_unfiltered(
    pid: Option<i32>,
    device: &str,
    fault: LinkFaultType,
    form: PatternForm,
    type_args: &[String],
    op: CommandOp,
) -> Vec<String> {
    let tc = tc_base(pid);
    match fault {
        LinkFaultType::Redirect => {
            let Some(destination) = type_args.first() else {
                error!("redirect fault is missing its destination interface");
                return Vec::new();
            };
            match op {
                // The static ffff: handle is fine, there is only ever one
                // ingress qdisc per interface.
                CommandOp::Enable => vec![format!(
                    "{tc} qdisc add dev {device} handle ffff: ingress ; \
                     {tc} filter add dev {device} parent ffff: matchall \
                     action mirred egress {} dev {destination}",
                    redirect_mode(type_args)
                )],
                CommandOp::Disable => vec![format!("{tc} qdisc del dev {device} ingress")],
            }
        }
        LinkFaultType::Bottleneck if form == PatternForm::Persistent => {
            match tbf_arguments(type_args) {
                Some(args) => vec![format!(
                    "{tc} qdisc {} dev {device} root tbf {args}",
                    op.tc_word()
                )],
                None => Vec::new(),
            }
        }
        _ => match netem_argument(fault, form, type_args) {
            Some(arg) => vec![format!(
                "{tc} qdisc {} dev {device} root netem {} {arg}",
                op.tc_word(),
                fault.keyword()
            )],
            None => Vec::new(),
        },
    }
}

fn render_filtered(
    pid: Option<i32>,
    device: &str,
    fault: LinkFaultType,
    form: PatternForm,
    type_args: &[String],
    filter: &TrafficFilter,
    op: CommandOp,
) -> Vec<String> {
    let tc = tc_base(pid);
    let redirect = fault == LinkFaultType::Redirect;

    if op == CommandOp::Disable {
        // Deleting the parent tears down the attached filters and children.
        return if redirect {
            vec![format!("{tc} qdisc del dev {device} ingress")]
        } else {
            vec![format!("{tc} qdisc del dev {device} root handle 1: prio")]
        };
    }

    let mut commands = Vec::new();
    if redirect {
        commands.push(format!("{tc} qdisc add dev {device} handle ffff: ingress"));
    } else {
        commands.push(format!("{tc} qdisc add dev {device} root handle 1: prio"));
    }

    let protocol_number = match filter.protocol.number() {
        Some(n) => n,
        None => {
            error!("filtered install without a concrete protocol");
            return Vec::new();
        }
    };
    let filter_base = format!(
        "{tc} filter add dev {device} parent 1:0 protocol ip prio 1 u32 \
         match ip protocol {protocol_number} 0xff"
    );

    let mut filters = Vec::new();
    if let Some(port) = filter.dst_port {
        filters.push(format!("{filter_base} match ip dport {port} 0xffff flowid 1:1"));
    }
    if let Some(port) = filter.src_port {
        filters.push(format!("{filter_base} match ip sport {port} 0xffff flowid 1:1"));
    }
    if filters.is_empty() {
        filters.push(format!("{filter_base} flowid 1:1"));
    }

    if redirect {
        let Some(destination) = type_args.first() else {
            error!("redirect fault is missing its destination interface");
            return Vec::new();
        };
        // The filters themselves carry the mirred action and hang off the
        // ingress qdisc; there is no child netem.
        let action = format!(
            " action mirred egress {} dev {destination}",
            redirect_mode(type_args)
        );
        for filter_command in filters {
            commands.push(filter_command.replace("parent 1:0", "parent ffff:") + &action);
        }
        return commands;
    }

    commands.extend(filters);

    let child = match fault {
        LinkFaultType::Bottleneck if form == PatternForm::Persistent => tbf_arguments(type_args)
            .map(|args| format!("{tc} qdisc add dev {device} parent 1:1 handle 2: tbf {args}")),
        _ => netem_argument(fault, form, type_args).map(|arg| {
            format!(
                "{tc} qdisc add dev {device} parent 1:1 handle 2: netem {} {arg}",
                fault.keyword()
            )
        }),
    };
    match child {
        Some(child) => commands.push(child),
        None => return Vec::new(),
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultynet_common::Protocol;

    fn any() -> TrafficFilter {
        TrafficFilter::default()
    }

    fn icmp() -> TrafficFilter {
        TrafficFilter {
            protocol: Protocol::Icmp,
            src_port: None,
            dst_port: None,
        }
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn persistent_loss_renders_add_and_del_pairs() {
        let enable = render_link_commands(
            Some(101),
            "h1-eth0",
            LinkFaultType::Loss,
            PatternForm::Persistent,
            &args(&["30%"]),
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(
            enable,
            vec!["nsenter --target 101 --net tc qdisc add dev h1-eth0 root netem loss 30%"]
        );
        let disable = render_link_commands(
            Some(101),
            "h1-eth0",
            LinkFaultType::Loss,
            PatternForm::Persistent,
            &args(&["30%"]),
            &any(),
            CommandOp::Disable,
        );
        assert_eq!(
            disable,
            vec!["nsenter --target 101 --net tc qdisc del dev h1-eth0 root netem loss 30%"]
        );
    }

    #[test]
    fn persistent_netem_defaults_to_full_strength() {
        let enable = render_link_commands(
            None,
            "s1-eth1",
            LinkFaultType::Corrupt,
            PatternForm::Persistent,
            &[],
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(enable, vec!["tc qdisc add dev s1-eth1 root netem corrupt 100%"]);
    }

    #[test]
    fn nil_pid_routes_without_nsenter() {
        let enable = render_link_commands(
            None,
            "lo",
            LinkFaultType::Delay,
            PatternForm::Persistent,
            &args(&["50ms"]),
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(enable, vec!["tc qdisc add dev lo root netem delay 50ms"]);
        assert!(!enable[0].contains("nsenter"));
    }

    #[test]
    fn random_delay_uses_the_reorder_complement() {
        let enable = render_link_commands(
            Some(7),
            "h1-eth0",
            LinkFaultType::Delay,
            PatternForm::Random(30),
            &args(&["50ms"]),
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(
            enable,
            vec!["nsenter --target 7 --net tc qdisc add dev h1-eth0 root netem delay 50ms reorder 70%"]
        );
    }

    #[test]
    fn random_netem_carries_the_intensity() {
        let enable = render_link_commands(
            Some(7),
            "h1-eth0",
            LinkFaultType::Loss,
            PatternForm::Random(10),
            &[],
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(
            enable,
            vec!["nsenter --target 7 --net tc qdisc add dev h1-eth0 root netem loss 10%"]
        );
    }

    #[test]
    fn bottleneck_defaults_burst_and_limit() {
        let enable = render_link_commands(
            Some(7),
            "h1-eth0",
            LinkFaultType::Bottleneck,
            PatternForm::Persistent,
            &args(&["256"]),
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(
            enable,
            vec!["nsenter --target 7 --net tc qdisc add dev h1-eth0 root tbf rate 256kbit burst 1600 limit 3000"]
        );
        let custom = render_link_commands(
            Some(7),
            "h1-eth0",
            LinkFaultType::Bottleneck,
            PatternForm::Persistent,
            &args(&["256", "3200", "6000"]),
            &any(),
            CommandOp::Enable,
        );
        assert!(custom[0].ends_with("tbf rate 256kbit burst 3200 limit 6000"));
    }

    #[test]
    fn random_bottleneck_renders_the_generic_netem_form() {
        let enable = render_link_commands(
            Some(7),
            "h1-eth0",
            LinkFaultType::Bottleneck,
            PatternForm::Random(10),
            &args(&["256"]),
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(
            enable,
            vec!["nsenter --target 7 --net tc qdisc add dev h1-eth0 root netem bottleneck 10%"]
        );
    }

    #[test]
    fn down_toggles_ifconfig() {
        let enable = render_link_commands(
            Some(55),
            "h1-eth0",
            LinkFaultType::Down,
            PatternForm::Persistent,
            &[],
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(enable, vec!["nsenter --target 55 --net ifconfig h1-eth0 down"]);
        let disable = render_link_commands(
            Some(55),
            "h1-eth0",
            LinkFaultType::Down,
            PatternForm::Persistent,
            &[],
            &any(),
            CommandOp::Disable,
        );
        assert_eq!(disable, vec!["nsenter --target 55 --net ifconfig h1-eth0 up"]);
    }

    #[test]
    fn redirect_installs_on_the_ingress_qdisc_only() {
        let enable = render_link_commands(
            None,
            "h1-eth0",
            LinkFaultType::Redirect,
            PatternForm::Persistent,
            &args(&["s1-eth3"]),
            &any(),
            CommandOp::Enable,
        );
        assert_eq!(enable.len(), 1);
        assert!(enable[0].contains("qdisc add dev h1-eth0 handle ffff: ingress"));
        assert!(enable[0].contains("filter add dev h1-eth0 parent ffff: matchall"));
        assert!(enable[0].contains("action mirred egress redirect dev s1-eth3"));
        assert!(!enable[0].contains("root"));

        let disable = render_link_commands(
            None,
            "h1-eth0",
            LinkFaultType::Redirect,
            PatternForm::Persistent,
            &args(&["s1-eth3"]),
            &any(),
            CommandOp::Disable,
        );
        assert_eq!(disable, vec!["tc qdisc del dev h1-eth0 ingress"]);
    }

    #[test]
    fn redirect_mirror_mode_is_selectable() {
        let enable = render_link_commands(
            None,
            "h1-eth0",
            LinkFaultType::Redirect,
            PatternForm::Persistent,
            &args(&["s1-eth3", "mirror"]),
            &any(),
            CommandOp::Enable,
        );
        assert!(enable[0].contains("action mirred egress mirror dev s1-eth3"));
    }

    #[test]
    fn random_redirect_is_rejected() {
        let commands = render_link_commands(
            None,
            "h1-eth0",
            LinkFaultType::Redirect,
            PatternForm::Random(5),
            &args(&["s1-eth3"]),
            &any(),
            CommandOp::Enable,
        );
        assert!(commands.is_empty());
    }

    #[test]
    fn filtered_install_creates_the_parent_before_children() {
        let enable = render_link_commands(
            Some(9),
            "h1-eth0",
            LinkFaultType::Loss,
            PatternForm::Persistent,
            &args(&["30%"]),
            &icmp(),
            CommandOp::Enable,
        );
        assert_eq!(enable.len(), 3);
        assert!(enable[0].ends_with("qdisc add dev h1-eth0 root handle 1: prio"));
        assert!(enable[1].contains("filter add dev h1-eth0 parent 1:0 protocol ip prio 1 u32"));
        assert!(enable[1].contains("match ip protocol 1 0xff"));
        assert!(enable[1].ends_with("flowid 1:1"));
        assert!(enable[2].ends_with("parent 1:1 handle 2: netem loss 30%"));

        let disable = render_link_commands(
            Some(9),
            "h1-eth0",
            LinkFaultType::Loss,
            PatternForm::Persistent,
            &args(&["30%"]),
            &icmp(),
            CommandOp::Disable,
        );
        assert_eq!(
            disable,
            vec!["nsenter --target 9 --net tc qdisc del dev h1-eth0 root handle 1: prio"]
        );
    }

    #[test]
    fn filtered_ports_add_u32_port_matches() {
        let filter = TrafficFilter {
            protocol: Protocol::Udp,
            src_port: Some(5353),
            dst_port: Some(53),
        };
        let enable = render_link_commands(
            Some(9),
            "h1-eth0",
            LinkFaultType::Loss,
            PatternForm::Persistent,
            &[],
            &filter,
            CommandOp::Enable,
        );
        // parent, one filter per port, child qdisc
        assert_eq!(enable.len(), 4);
        assert!(enable[1].contains("match ip protocol 17 0xff match ip dport 53 0xffff"));
        assert!(enable[2].contains("match ip protocol 17 0xff match ip sport 5353 0xffff"));
    }

    #[test]
    fn filtered_redirect_attaches_the_action_to_the_filters() {
        let enable = render_link_commands(
            None,
            "h1-eth0",
            LinkFaultType::Redirect,
            PatternForm::Persistent,
            &args(&["s1-eth3"]),
            &icmp(),
            CommandOp::Enable,
        );
        assert_eq!(enable.len(), 2);
        assert!(enable[0].ends_with("qdisc add dev h1-eth0 handle ffff: ingress"));
        assert!(enable[1].contains("parent ffff:"));
        assert!(!enable[1].contains("parent 1:0"));
        assert!(enable[1].contains("match ip protocol 1 0xff"));
        assert!(enable[1].ends_with("action mirred egress redirect dev s1-eth3"));

        let disable = render_link_commands(
            None,
            "h1-eth0",
            LinkFaultType::Redirect,
            PatternForm::Persistent,
            &args(&["s1-eth3"]),
            &icmp(),
            CommandOp::Disable,
        );
        assert_eq!(disable, vec!["tc qdisc del dev h1-eth0 ingress"]);
    }

    #[test]
    fn filtered_protocol_numbers_follow_iana() {
        for (protocol, number) in [
            (Protocol::Icmp, 1),
            (Protocol::Igmp, 2),
            (Protocol::Ip, 4),
            (Protocol::Tcp, 6),
            (Protocol::Udp, 17),
            (Protocol::Ipv6, 41),
            (Protocol::Ipv6Icmp, 58),
        ] {
            let filter = TrafficFilter {
                protocol,
                src_port: None,
                dst_port: None,
            };
            let enable = render_link_commands(
                None,
                "h1-eth0",
                LinkFaultType::Loss,
                PatternForm::Persistent,
                &[],
                &filter,
                CommandOp::Enable,
            );
            assert!(enable[1].contains(&format!("match ip protocol {number} 0xff")));
        }
    }

    #[test]
    fn stress_command_normalizes_against_the_cgroup() {
        assert_eq!(
            stress_cpu_command(50.0, 0.3, 5),
            "stress-ng -l 15 -t 5 --cpu 1 --cpu-method decimal64&"
        );
        assert_eq!(
            nsenter_all(Some(42), "stress-ng -l 15 -t 5 --cpu 1 --cpu-method decimal64&"),
            "nsenter --target 42 --net --pid --all stress-ng -l 15 -t 5 --cpu 1 --cpu-method decimal64&"
        );
    }
}
