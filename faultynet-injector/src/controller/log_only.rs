// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! A strategy that injects nothing and simply keeps the controller (and
//! with it the fault logger) alive until shutdown.

use crate::context::ControllerContext;
use crate::controller::strategy::InjectionStrategy;
use async_trait::async_trait;
use tracing::debug;

#[derive(Default)]
pub struct LogOnlyStrategy;

#[async_trait]
impl InjectionStrategy for LogOnlyStrategy {
    fn name(&self) -> &'static str {
        "log_only"
    }

    fn iteration_count(&self) -> usize {
        0
    }

    async fn do_iteration(&mut self, _ctx: &ControllerContext, _iteration: usize) {}

    async fn run(&mut self, ctx: &ControllerContext) {
        debug!("initiating logger");
        ctx.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::recording::RecordingRunner;
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_until_deactivated() {
        let ctx = ControllerContext::new(Arc::new(RecordingRunner::default()));
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut strategy = LogOnlyStrategy;
                strategy.run(&ctx).await
            })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());
        ctx.cancel.cancel();
        task.await.unwrap();
    }
}
