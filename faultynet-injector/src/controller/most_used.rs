// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! The most-used-link strategy: each iteration measures packet-count deltas
//! on every not-yet-injected candidate, greedily adds the busiest one to the
//! running set, and re-installs the shared fault on every chosen link.

use crate::context::ControllerContext;
use crate::controller::random_links::shared_spec_from_config;
use crate::controller::strategy::{InjectionStrategy, SharedFaultSpec};
use async_trait::async_trait;
use faultynet_common::{Config, ResolvedLink, RunMode};
use futures::future::join_all;
use tracing::{debug, info, warn};

struct Candidate {
    link: ResolvedLink,
    traffic: i64,
}

pub struct MostUsedLinkStrategy {
    candidates: Vec<Candidate>,
    chosen: Vec<usize>,
    end_links: usize,
    mode: RunMode,
    shared: Option<SharedFaultSpec>,
}

impl MostUsedLinkStrategy {
    pub fn from_config(config: &Config) -> MostUsedLinkStrategy {
        MostUsedLinkStrategy {
            candidates: config
                .links
                .iter()
                .map(|link| Candidate {
                    link: link.clone(),
                    traffic: 0,
                })
                .collect(),
            chosen: Vec::new(),
            end_links: config.end_links.unwrap_or(usize::MAX),
            mode: config.mode.unwrap_or_default(),
            shared: shared_spec_from_config(config),
        }
    }

    /// TX+RX packet counts of one side of the link. Only one side is
    /// checked; candidates are faultless while being measured, so the two
    /// sides stay close enough.
    async fn traffic_on_link(&self, ctx: &ControllerContext, link: &ResolvedLink) -> i64 {
        let prefix = match link.a.pid {
            Some(pid) => format!("nsenter --target {pid} --net "),
            None => String::new(),
        };
        let rx_command = format!(
            "{prefix}ifconfig {} | grep \"RX packets\" | awk '{{print $3}}'",
            link.a.interface
        );
        let tx_command = format!(
            "{prefix}ifconfig {} | grep \"TX packets\" | awk '{{print $3}}'",
            link.a.interface
        );
        let received = parse_packet_count(&ctx.runner.run(&rx_command).await.output);
        let transmitted = parse_packet_count(&ctx.runner.run(&tx_command).await.output);
        debug!(
            "link {}->{} has usage of {}",
            link.a.node,
            link.b.node,
            received + transmitted
        );
        received + transmitted
    }
}

fn parse_packet_count(output: &str) -> i64 {
    match output.trim().parse() {
        Ok(count) => count,
        Err(_) => {
            warn!("could not parse packet count from '{}'", output.trim());
            0
        }
    }
}

#[async_trait]
impl InjectionStrategy for MostUsedLinkStrategy {
    fn name(&self) -> &'static str {
        "most_used_link"
    }

    fn mode(&self) -> RunMode {
        self.mode
    }

    fn iteration_count(&self) -> usize {
        if self.shared.is_none() {
            return 0;
        }
        self.end_links.min(self.candidates.len())
    }

    async fn do_iteration(&mut self, ctx: &ControllerContext, _iteration: usize) {
        // Measure every candidate that doesn't carry a fault yet and pick
        // the one with the largest delta since the previous iteration.
        let mut busiest: Option<(usize, i64)> = None;
        for index in 0..self.candidates.len() {
            if self.chosen.contains(&index) {
                continue;
            }
            let traffic = self.traffic_on_link(ctx, &self.candidates[index].link).await;
            let delta = traffic - self.candidates[index].traffic;
            self.candidates[index].traffic = traffic;
            if busiest.map_or(true, |(_, max)| delta > max) {
                busiest = Some((index, delta));
            }
        }
        if let Some((index, _)) = busiest {
            self.chosen.push(index);
        }

        let Some(shared) = &self.shared else { return };
        let mut faults = Vec::with_capacity(self.chosen.len() * 2);
        for &index in &self.chosen {
            let (forward, backward) = shared.injectors_for_link(&self.candidates[index].link);
            faults.push(forward);
            faults.push(backward);
        }

        info!("Injecting faults on {} links", self.chosen.len());
        join_all(faults.iter().map(|injector| injector.run(ctx))).await;
        debug!("fault iteration is done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::recording::RecordingRunner;
    use crate::shell::CommandOutput;
    use faultynet_common::{FaultPattern, LinkEnd};
    use std::sync::Arc;

    fn link(n: usize) -> ResolvedLink {
        ResolvedLink {
            a: LinkEnd {
                pid: Some(100 + n as i32),
                interface: format!("h{n}-eth0"),
                node: format!("h{n}"),
            },
            b: LinkEnd {
                pid: None,
                interface: format!("s1-eth{n}"),
                node: "s1".into(),
            },
        }
    }

    fn config(end: usize, links: usize) -> Config {
        Config {
            fault_type: Some("link_fault:loss".into()),
            type_args: vec!["30%".into()],
            pattern: Some(FaultPattern::Persistent),
            injection_time: Some(1.0),
            end_links: Some(end),
            links: (1..=links).map(link).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn iteration_count_is_clamped_to_the_candidates() {
        let strategy = MostUsedLinkStrategy::from_config(&config(5, 3));
        assert_eq!(strategy.iteration_count(), 3);
        let strategy = MostUsedLinkStrategy::from_config(&config(2, 3));
        assert_eq!(strategy.iteration_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn the_busiest_link_is_added_first_and_reinstalled() {
        let runner = Arc::new(RecordingRunner::default());
        // h2's interface reports the most packets.
        runner.respond("ifconfig h1-eth0", CommandOutput::ok("10\n"));
        runner.respond("ifconfig h2-eth0", CommandOutput::ok("500\n"));
        runner.respond("ifconfig h3-eth0", CommandOutput::ok("20\n"));
        let ctx = ControllerContext::new(runner.clone());

        let mut strategy = MostUsedLinkStrategy::from_config(&config(2, 3));
        strategy.run(&ctx).await;

        let tc_commands: Vec<String> = runner
            .commands()
            .into_iter()
            .filter(|c| c.contains(" tc ") || c.starts_with("tc "))
            .collect();
        // Iteration 1 installs h2's link (both directions), iteration 2
        // re-installs it alongside the next pick: 2 + 4 directions, with an
        // enable and a disable each.
        assert_eq!(tc_commands.len(), 12);
        assert!(tc_commands[0].contains("h2-eth0"));

        // The second iteration re-installs the first pick.
        let second_round = &tc_commands[4..];
        assert!(second_round.iter().any(|c| c.contains("h2-eth0")));
    }

    #[tokio::test(start_paused = true)]
    async fn measurement_failures_count_as_zero_traffic() {
        let runner = Arc::new(RecordingRunner::default());
        runner.respond("ifconfig", CommandOutput::ok("not a number"));
        let ctx = ControllerContext::new(runner.clone());

        let mut strategy = MostUsedLinkStrategy::from_config(&config(1, 2));
        strategy.run(&ctx).await;

        // Still picks some link and injects it.
        let enables = runner
            .commands()
            .into_iter()
            .filter(|c| c.contains(" add "))
            .count();
        assert_eq!(enables, 2);
    }
}
