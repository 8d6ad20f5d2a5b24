// Copyright 2024-Present Faultynet contributors.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide map of currently active faults, keyed by tag. Injectors
//! insert on every enable and remove on every disable; the fault logger
//! snapshots it on each tick. Tags are assumed globally unique; a colliding
//! enable silently overwrites the previous entry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// The most recent enable record for a tag, exactly as it appears in log
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFault {
    pub fault_tag: String,
    pub fault_type: String,
    pub command: String,
    pub retcode: i32,
}

#[derive(Debug, Default)]
pub struct FaultRegistry {
    inner: Mutex<HashMap<String, ActiveFault>>,
}

impl FaultRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveFault>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_active(&self, tag: &str, fault_type: &str, command: &str, retcode: i32) {
        self.lock().insert(
            tag.to_string(),
            ActiveFault {
                fault_tag: tag.to_string(),
                fault_type: fault_type.to_string(),
                command: command.to_string(),
                retcode,
            },
        );
    }

    pub fn set_inactive(&self, tag: &str) {
        if self.lock().remove(tag).is_none() {
            warn!(
                "could not disable fault {tag}, likely due to duplicate tag or race condition; \
                 logs may be incorrect"
            );
        }
    }

    /// List-copy of the current entries, in tag order so log output is
    /// stable.
    pub fn snapshot(&self) -> Vec<ActiveFault> {
        let mut faults: Vec<ActiveFault> = self.lock().values().cloned().collect();
        faults.sort_by(|a, b| a.fault_tag.cmp(&b.fault_tag));
        faults
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
