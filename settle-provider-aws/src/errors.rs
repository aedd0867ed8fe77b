//! Classification of AWS SDK errors into [`ErrorKind`]s

use aws_sdk_finspace::error::{ProvideErrorMetadata, SdkError};
use settle_core::error::{ErrorKind, ProviderError};

/// Error codes meaning the addressed object does not exist
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFoundException",
    "NotFoundException",
    "PolicyNotFound",
    "LoadBalancerNotFound",
    "ListenerNotFound",
];

/// Error codes worth retrying
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "InternalServerException",
    "InternalFailure",
    "ServiceUnavailable",
    "ServiceUnavailableException",
];

pub(crate) fn classify_code(code: Option<&str>) -> ErrorKind {
    match code {
        Some(code) if NOT_FOUND_CODES.contains(&code) => ErrorKind::NotFound,
        Some(code) if TRANSIENT_CODES.contains(&code) => ErrorKind::Transient,
        _ => ErrorKind::Api,
    }
}

/// Convert an SDK error, keeping it as the cause
pub(crate) fn sdk_error<E, R>(action: &str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::ServiceError(service) => classify_code(service.err().code()),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorKind::Transient
        }
        _ => ErrorKind::Api,
    };
    let message = match err.message() {
        Some(message) => format!("{} failed: {}", action, message),
        None => format!("{} failed: {}", action, err),
    };
    ProviderError::new(kind).with_message(message).with_cause(err)
}

/// Convert a request builder error (a required field was not set)
pub(crate) fn build_error(
    what: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> ProviderError {
    ProviderError::invalid_configuration(format!("invalid {}: {}", what, err)).with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        assert_eq!(classify_code(Some("ResourceNotFoundException")), ErrorKind::NotFound);
        assert_eq!(classify_code(Some("PolicyNotFound")), ErrorKind::NotFound);
        assert_eq!(classify_code(Some("LoadBalancerNotFound")), ErrorKind::NotFound);
    }

    #[test]
    fn throttling_is_transient() {
        assert_eq!(classify_code(Some("ThrottlingException")), ErrorKind::Transient);
        assert_eq!(classify_code(Some("Throttling")), ErrorKind::Transient);
    }

    #[test]
    fn everything_else_is_api() {
        assert_eq!(classify_code(Some("ValidationException")), ErrorKind::Api);
        assert_eq!(classify_code(Some("ConflictException")), ErrorKind::Api);
        assert_eq!(classify_code(None), ErrorKind::Api);
    }

    #[test]
    fn timeouts_are_transient() {
        let err: SdkError<aws_sdk_finspace::operation::get_kx_cluster::GetKxClusterError, ()> =
            SdkError::timeout_error("connect timeout");
        let err = sdk_error("GetKxCluster", err);
        assert!(err.is_transient());
    }
}
