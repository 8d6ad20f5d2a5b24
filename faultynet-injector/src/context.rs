// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Shared state handed to every injector task and strategy: the shell
//! runner, the active-fault registry, the shutdown token and the next-run
//! latch for manual-mode strategies.

use crate::registry::FaultRegistry;
use crate::shell::CommandRunner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Set by a `START_NEXT_RUN` frame, consumed by the next
/// `wait_for_next_run`.
#[derive(Debug, Default)]
pub struct NextRunLatch {
    flag: AtomicBool,
    notify: Notify,
}

impl NextRunLatch {
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Waits until the latch is set (consuming it) or the controller is
    /// deactivated. Returns false on deactivation.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        loop {
            let notified = self.notify.notified();
            if self.flag.swap(false, Ordering::SeqCst) {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = notified => {}
            }
        }
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub runner: Arc<dyn CommandRunner>,
    pub registry: Arc<FaultRegistry>,
    pub cancel: CancellationToken,
    pub next_run: Arc<NextRunLatch>,
}

impl ControllerContext {
    pub fn new(runner: Arc<dyn CommandRunner>) -> ControllerContext {
        ControllerContext {
            runner,
            registry: Arc::new(FaultRegistry::default()),
            cancel: CancellationToken::new(),
            next_run: Arc::new(NextRunLatch::default()),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Sleeps for `duration` unless the controller is deactivated first.
/// Returns true when the full duration elapsed. Injectors only observe
/// cancellation at these boundaries.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
