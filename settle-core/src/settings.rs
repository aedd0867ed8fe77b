//! Lifecycle settings read from the manifest's `settings` block

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::status::Operation;
use crate::transition::TransitionTable;
use crate::waiter::DEFAULT_POLL_INTERVAL;

/// Per-operation timeout overrides, in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutOverrides {
    pub create: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub poll_interval_secs: u64,
    /// Overrides every table's initial delay when set
    pub initial_delay_secs: Option<u64>,
    pub timeouts: TimeoutOverrides,
    pub retry: RetryPolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            initial_delay_secs: None,
            timeouts: TimeoutOverrides::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl LifecycleSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// The table to wait on for `operation`, with overrides applied
    pub fn apply(&self, operation: Operation, table: &TransitionTable) -> TransitionTable {
        let mut table = table.clone();
        let timeout = match operation {
            Operation::Create => self.timeouts.create,
            Operation::Update => self.timeouts.update,
            Operation::Delete => self.timeouts.delete,
            Operation::Read => None,
        };
        if let Some(secs) = timeout {
            table.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.initial_delay_secs {
            table.delay = Duration::from_secs(secs);
        }
        table
    }
}
