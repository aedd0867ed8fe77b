//! State transition tables
//!
//! A table says, for one operation on one resource type, which observed
//! statuses mean "still working", which mean "done", and which mean "will
//! never get there". Tables are static data; the waiter interprets them.

use std::time::Duration;

use thiserror::Error;

use crate::status::{Operation, Status};

/// Default time allowed for a resource to settle
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Consecutive not-found probes tolerated while waiting for a resource to appear
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// What a "resource not found" probe result means during a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// The resource is gone; the wait is over (delete waits)
    Settle,
    /// Read-after-write lag; keep polling, but fail after more than this many
    /// consecutive misses
    Tolerate(u32),
}

/// Invalid transition table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("status {status} appears in both the {first} and {second} sets")]
    Overlap {
        status: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("target set is empty but not-found does not settle the wait")]
    Unreachable,

    #[error("target_occurrences must be at least 1")]
    ZeroOccurrences,
}

/// Pending, target and failure statuses for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
    pub failure: &'static [&'static str],
    pub not_found: NotFoundPolicy,
    pub timeout: Duration,
    /// Wait this long before the first probe
    pub delay: Duration,
    /// Number of consecutive target observations required
    pub target_occurrences: u32,
}

impl TransitionTable {
    pub const fn new(pending: &'static [&'static str], target: &'static [&'static str]) -> Self {
        Self {
            pending,
            target,
            failure: &[],
            not_found: NotFoundPolicy::Tolerate(DEFAULT_NOT_FOUND_CHECKS),
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            target_occurrences: 1,
        }
    }

    /// A delete wait: disappearance counts as success
    pub const fn deletion(pending: &'static [&'static str], target: &'static [&'static str]) -> Self {
        Self::new(pending, target).not_found(NotFoundPolicy::Settle)
    }

    pub const fn failure(mut self, failure: &'static [&'static str]) -> Self {
        self.failure = failure;
        self
    }

    pub const fn not_found(mut self, policy: NotFoundPolicy) -> Self {
        self.not_found = policy;
        self
    }

    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub const fn target_occurrences(mut self, occurrences: u32) -> Self {
        self.target_occurrences = occurrences;
        self
    }

    pub fn is_pending(&self, status: &Status) -> bool {
        status.is_in(self.pending)
    }

    pub fn is_target(&self, status: &Status) -> bool {
        status.is_in(self.target)
    }

    pub fn is_failure(&self, status: &Status) -> bool {
        status.is_in(self.failure)
    }

    /// Check that the sets are pairwise disjoint and the wait can succeed
    pub fn validate(&self) -> Result<(), TableError> {
        let sets = [
            ("pending", self.pending),
            ("target", self.target),
            ("failure", self.failure),
        ];
        for (i, (first, a)) in sets.iter().enumerate() {
            for (second, b) in &sets[i + 1..] {
                if let Some(status) = a.iter().find(|s| b.contains(*s)) {
                    return Err(TableError::Overlap {
                        status: status.to_string(),
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        if self.target.is_empty() && self.not_found != NotFoundPolicy::Settle {
            return Err(TableError::Unreachable);
        }

        if self.target_occurrences == 0 {
            return Err(TableError::ZeroOccurrences);
        }

        Ok(())
    }
}

/// Tables for every mutating operation of a resource type
///
/// `None` means the remote call completes synchronously and there is
/// nothing to wait for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTables {
    pub create: Option<TransitionTable>,
    pub update: Option<TransitionTable>,
    pub delete: Option<TransitionTable>,
}

impl TransitionTables {
    /// No waits for any operation
    pub const fn immediate() -> Self {
        Self {
            create: None,
            update: None,
            delete: None,
        }
    }

    pub fn for_operation(&self, operation: Operation) -> Option<&TransitionTable> {
        match operation {
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
            Operation::Read => None,
        }
    }

    pub fn validate(&self) -> Result<(), TableError> {
        for table in [&self.create, &self.update, &self.delete]
            .into_iter()
            .flatten()
        {
            table.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_create_table() {
        let table = TransitionTable::new(&["PENDING", "CREATING"], &["RUNNING"])
            .failure(&["CREATE_FAILED"]);
        assert!(table.validate().is_ok());
        assert!(table.is_pending(&Status::from("CREATING")));
        assert!(table.is_target(&Status::from("RUNNING")));
        assert!(table.is_failure(&Status::from("CREATE_FAILED")));
    }

    #[test]
    fn overlapping_sets_are_rejected() {
        let table = TransitionTable::new(&["ACTIVE", "UPDATING"], &["ACTIVE"]);
        assert_eq!(
            table.validate(),
            Err(TableError::Overlap {
                status: "ACTIVE".to_string(),
                first: "pending",
                second: "target",
            })
        );

        let table = TransitionTable::new(&["CREATING"], &["ACTIVE"]).failure(&["ACTIVE"]);
        assert!(matches!(
            table.validate(),
            Err(TableError::Overlap {
                first: "target",
                second: "failure",
                ..
            })
        ));
    }

    #[test]
    fn empty_target_requires_settling_on_not_found() {
        let table = TransitionTable::new(&["DELETING"], &[]);
        assert_eq!(table.validate(), Err(TableError::Unreachable));

        let table = TransitionTable::deletion(&["DELETING"], &[]);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn zero_occurrences_is_rejected() {
        let table = TransitionTable::new(&["CREATING"], &["ACTIVE"]).target_occurrences(0);
        assert_eq!(table.validate(), Err(TableError::ZeroOccurrences));
    }

    #[test]
    fn tables_by_operation() {
        let tables = TransitionTables {
            create: Some(TransitionTable::new(&["CREATING"], &["ACTIVE"])),
            update: None,
            delete: Some(TransitionTable::deletion(&["DELETING"], &["DELETED"])),
        };
        assert!(tables.for_operation(Operation::Create).is_some());
        assert!(tables.for_operation(Operation::Update).is_none());
        assert_eq!(
            tables.for_operation(Operation::Delete).map(|t| t.not_found),
            Some(NotFoundPolicy::Settle)
        );
        assert!(tables.for_operation(Operation::Read).is_none());
        assert!(tables.validate().is_ok());
    }
}
