//! Error type shared by handlers, the waiter and the reconciler

use std::time::Duration;

use thiserror::Error;

use crate::resource::ResourceId;
use crate::status::{Operation, Status};

/// What went wrong, independent of which resource it happened to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// The remote resource does not exist
    #[error("resource not found")]
    NotFound,

    /// A composite identifier did not have the expected number of parts
    #[error("malformed identifier {identifier:?}: expected {expected} parts, found {found}")]
    MalformedIdentifier {
        identifier: String,
        expected: usize,
        found: usize,
    },

    /// Polling ran out of time before reaching a target or failure status
    #[error("timed out after {elapsed:?} (last status: {})", display_status(.last_status))]
    Timeout {
        elapsed: Duration,
        last_status: Option<Status>,
    },

    /// The resource entered a status that will never settle successfully
    #[error("resource entered failure status {status}{}", display_reason(.reason))]
    FailureState {
        status: Status,
        reason: Option<String>,
    },

    /// Throttling, network or server-side errors worth retrying
    #[error("transient API error")]
    Transient,

    /// The caller cancelled the operation
    #[error("cancelled (last status: {})", display_status(.last_status))]
    Cancelled { last_status: Option<Status> },

    /// Any other remote API error
    #[error("API error")]
    Api,

    /// Local configuration cannot be translated into a remote request
    #[error("invalid configuration")]
    InvalidConfiguration,

    /// The operation is not supported for this resource type
    #[error("unsupported operation")]
    Unsupported,
}

fn display_status(status: &Option<Status>) -> String {
    status
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none observed".to_string())
}

fn display_reason(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub resource_id: Option<ResourceId>,
    pub operation: Option<Operation>,
    pub identifier: Option<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] ", id)?;
        }
        match (&self.operation, &self.identifier) {
            (Some(op), Some(identifier)) => write!(f, "{} {}: ", op, identifier)?,
            (Some(op), None) => write!(f, "{}: ", op)?,
            (None, Some(identifier)) => write!(f, "{}: ", identifier)?,
            (None, None) => {}
        }
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            resource_id: None,
            operation: None,
            identifier: None,
            cause: None,
        }
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Api).with_message(message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient).with_message(message)
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration).with_message(message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    /// Attach the operation and identifier, keeping any already set
    pub fn during(mut self, operation: Operation, identifier: Option<&str>) -> Self {
        self.operation.get_or_insert(operation);
        if self.identifier.is_none() {
            self.identifier = identifier.map(str::to_string);
        }
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl From<ErrorKind> for ProviderError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_resource_operation_and_identifier() {
        let err = ProviderError::new(ErrorKind::Timeout {
            elapsed: Duration::from_secs(60),
            last_status: Some(Status::from("CREATING")),
        })
        .for_resource(ResourceId::new("kx.cluster", "hdb"))
        .during(Operation::Create, Some("env-1,hdb"));

        assert_eq!(
            err.to_string(),
            "[kx.cluster.hdb] create env-1,hdb: timed out after 60s (last status: CREATING)"
        );
    }

    #[test]
    fn failure_state_includes_reason() {
        let err = ProviderError::new(ErrorKind::FailureState {
            status: Status::from("CREATE_FAILED"),
            reason: Some("subnet has no free addresses".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "resource entered failure status CREATE_FAILED: subnet has no free addresses"
        );
    }

    #[test]
    fn during_keeps_existing_context() {
        let err = ProviderError::not_found()
            .during(Operation::Update, Some("a,b"))
            .during(Operation::Read, Some("c,d"));
        assert_eq!(err.operation, Some(Operation::Update));
        assert_eq!(err.identifier.as_deref(), Some("a,b"));
    }

    #[test]
    fn api_error_carries_message() {
        let err = ProviderError::api("AccessDenied");
        assert_eq!(err.to_string(), "API error: AccessDenied");
        assert!(!err.is_transient());
    }
}
