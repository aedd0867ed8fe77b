//! Cloud Control API error classification

use aws_sdk_cloudcontrol::error::{ProvideErrorMetadata, SdkError};
use settle_core::error::{ErrorKind, ProviderError};

const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException", "RequestTokenNotFoundException"];

/// Worth another attempt: the request never reached the resource handler
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "ServiceInternalErrorException",
    "NetworkFailureException",
    "ConcurrentOperationException",
    "HandlerInternalFailureException",
];

pub(crate) fn classify_code(code: Option<&str>) -> ErrorKind {
    match code {
        Some(code) if NOT_FOUND_CODES.contains(&code) => ErrorKind::NotFound,
        Some(code) if TRANSIENT_CODES.contains(&code) => ErrorKind::Transient,
        _ => ErrorKind::Api,
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_cloud_control_codes() {
        assert_eq!(classify_code(Some("ResourceNotFoundException")), ErrorKind::NotFound);
        assert_eq!(classify_code(Some("ConcurrentOperationException")), ErrorKind::Transient);
        assert_eq!(classify_code(Some("AlreadyExistsException")), ErrorKind::Api);
        assert_eq!(classify_code(None), ErrorKind::Api);
    }
}
