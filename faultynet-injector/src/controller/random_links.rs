// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! The random-links strategy: iteration `i` picks `start_links + i` distinct
//! candidate links uniformly at random and installs the shared fault on both
//! directions of each.

use crate::context::ControllerContext;
use crate::controller::strategy::{InjectionStrategy, SharedFaultSpec};
use async_trait::async_trait;
use faultynet_common::{parse_fault_type, Config, ParsedFaultType, ResolvedLink, RunMode};
use futures::future::join_all;
use rand::seq::SliceRandom;
use tracing::{debug, error, info};

pub struct RandomLinksStrategy {
    links: Vec<ResolvedLink>,
    start_links: usize,
    end_links: usize,
    mode: RunMode,
    shared: Option<SharedFaultSpec>,
}

/// Parses the flat root keys shared by the link-selection strategies into a
/// [`SharedFaultSpec`]. `None` (with an error log) leaves the strategy with
/// nothing to run, which is the closest non-fatal disposition for a broken
/// top-level config.
pub(crate) fn shared_spec_from_config(config: &Config) -> Option<SharedFaultSpec> {
    let Some(type_value) = config.fault_type.as_deref() else {
        error!("no fault type set");
        return None;
    };
    let fault = match parse_fault_type(type_value) {
        Ok(ParsedFaultType::Link(fault)) => fault,
        _ => {
            error!("unknown fault type: '{type_value}'");
            return None;
        }
    };
    Some(SharedFaultSpec {
        fault,
        type_args: config.type_args.clone(),
        pattern: config.pattern.unwrap_or_default(),
        pattern_args: config.pattern_args.clone(),
        injection_time: config.injection_time.unwrap_or_default(),
    })
}

impl RandomLinksStrategy {
    pub fn from_config(config: &Config) -> RandomLinksStrategy {
        RandomLinksStrategy {
            links: config.links.clone(),
            start_links: config.start_links.unwrap_or(1),
            end_links: config.end_links.unwrap_or(usize::MAX),
            mode: config.mode.unwrap_or_default(),
            shared: shared_spec_from_config(config),
        }
    }
}

#[async_trait]
impl InjectionStrategy for RandomLinksStrategy {
    fn name(&self) -> &'static str {
        "random_links"
    }

    fn mode(&self) -> RunMode {
        self.mode
    }

    fn iteration_count(&self) -> usize {
        if self.shared.is_none() {
            return 0;
        }
        let end = self.end_links.min(self.links.len());
        (end + 1).saturating_sub(self.start_links)
    }

    async fn do_iteration(&mut self, ctx: &ControllerContext, iteration: usize) {
        let Some(shared) = &self.shared else { return };
        let count = self.start_links + iteration;
        let chosen: Vec<&ResolvedLink> = self
            .links
            .choose_multiple(&mut rand::thread_rng(), count)
            .collect();

        let mut faults = Vec::with_capacity(chosen.len() * 2);
        for link in chosen {
            let (forward, backward) = shared.injectors_for_link(link);
            faults.push(forward);
            faults.push(backward);
        }

        info!("Injecting faults on {count} links");
        join_all(faults.iter().map(|injector| injector.run(ctx))).await;
        debug!("fault iteration is done");
    }
}
