//! Status probing

use crate::error::ProviderResult;
use crate::provider::BoxFuture;
use crate::status::Status;

/// Result of a single status probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The resource exists and reports this status
    Found {
        status: Status,
        /// Free-form explanation the remote attaches to the status, if any
        reason: Option<String>,
    },
    /// The remote API says the resource does not exist
    NotFound,
}

impl Observation {
    pub fn found(status: impl Into<Status>) -> Self {
        Self::Found {
            status: status.into(),
            reason: None,
        }
    }

    pub fn with_reason(self, reason: Option<impl Into<String>>) -> Self {
        match self {
            Self::Found { status, .. } => Self::Found {
                status,
                reason: reason.map(Into::into),
            },
            Self::NotFound => Self::NotFound,
        }
    }

    /// Turn the result of a remote lookup into an observation
    ///
    /// A `NotFound` error becomes [`Observation::NotFound`]; every other error
    /// is passed through.
    pub fn from_lookup<T>(
        result: ProviderResult<T>,
        observe: impl FnOnce(T) -> Observation,
    ) -> ProviderResult<Observation> {
        match result {
            Ok(output) => Ok(observe(output)),
            Err(e) if e.is_not_found() => Ok(Observation::NotFound),
            Err(e) => Err(e),
        }
    }
}

/// Read-only status lookup for one kind of resource
pub trait StatusProber: Send + Sync {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>>;
}
