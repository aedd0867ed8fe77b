//! Cloud Control request tracking
//!
//! Every mutating Cloud Control call returns a request token. The request
//! itself moves through PENDING and IN_PROGRESS to SUCCESS or FAILED, so it
//! is waited on like any other resource: the token is the identifier and
//! the request status is the observed status.

use std::time::Duration;

use aws_sdk_cloudcontrol::Client;
use aws_sdk_cloudcontrol::types::{HandlerErrorCode, OperationStatus, ProgressEvent};
use settle_core::CancellationToken;
use settle_core::error::{ErrorKind, ProviderError, ProviderResult};
use settle_core::probe::{Observation, StatusProber};
use settle_core::provider::BoxFuture;
use settle_core::settings::LifecycleSettings;
use settle_core::status::Operation;
use settle_core::transition::{NotFoundPolicy, TransitionTable};
use settle_core::waiter::Waiter;

use crate::errors::sdk_error;

pub(crate) const REQUEST_TABLE: TransitionTable =
    TransitionTable::new(&["PENDING", "IN_PROGRESS", "CANCEL_IN_PROGRESS"], &["SUCCESS"])
        .failure(&["FAILED", "CANCEL_COMPLETE"])
        .not_found(NotFoundPolicy::Tolerate(0))
        .timeout(Duration::from_secs(10 * 60));

/// Looks up request status by token
pub(crate) struct RequestStatusProber {
    client: Client,
}

impl RequestStatusProber {
    pub(crate) async fn progress(&self, request_token: &str) -> ProviderResult<ProgressEvent> {
        let output = self
            .client
            .get_resource_request_status()
            .request_token(request_token)
            .send()
            .await
            .map_err(|e| sdk_error("GetResourceRequestStatus", e))?;
        output.progress_event().cloned().ok_or_else(|| {
            ProviderError::api(format!("request {} has no progress event", request_token))
        })
    }
}

/// A failed request whose handler reported NotFound means the resource is gone
pub(crate) fn observe(progress: &ProgressEvent) -> Observation {
    if progress.operation_status() == Some(&OperationStatus::Failed)
        && progress.error_code() == Some(&HandlerErrorCode::NotFound)
    {
        return Observation::NotFound;
    }
    Observation::found(
        progress
            .operation_status()
            .map(|s| s.as_str())
            .unwrap_or("UNKNOWN"),
    )
    .with_reason(progress.status_message())
}

impl StatusProber for RequestStatusProber {
    fn probe<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
        Box::pin(async move { Ok(observe(&self.progress(identifier).await?)) })
    }
}

pub(crate) struct RequestTracker {
    prober: RequestStatusProber,
    waiter: Waiter,
    settings: LifecycleSettings,
    cancel: CancellationToken,
}

impl RequestTracker {
    pub(crate) fn new(
        client: Client,
        settings: LifecycleSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            prober: RequestStatusProber { client },
            waiter: Waiter::new(settings.poll_interval()),
            settings,
            cancel,
        }
    }

    /// Wait for the request behind `progress` and return the resource
    /// identifier it reports
    ///
    /// Errors after the request was accepted are never transient: retrying
    /// the mutating call would issue a second request.
    pub(crate) async fn track(
        &self,
        operation: Operation,
        progress: Option<&ProgressEvent>,
    ) -> ProviderResult<Option<String>> {
        let progress = progress.ok_or_else(|| ProviderError::api("no progress event returned"))?;
        if progress.operation_status() == Some(&OperationStatus::Success) {
            return Ok(progress.identifier().map(str::to_string));
        }
        let request_token = progress
            .request_token()
            .ok_or_else(|| ProviderError::api("no request token returned"))?;

        let table = self.settings.apply(operation, &REQUEST_TABLE);
        log::debug!("tracking {} request {}", operation, request_token);
        self.waiter
            .wait_for(&self.prober, &table, request_token, table.timeout, &self.cancel)
            .await
            .map_err(not_retryable)?;

        let finished = self.prober.progress(request_token).await.map_err(not_retryable)?;
        Ok(finished.identifier().map(str::to_string))
    }
}

fn not_retryable(err: ProviderError) -> ProviderError {
    if err.is_transient() {
        let message = err.message.clone().unwrap_or_default();
        ProviderError::new(ErrorKind::Api)
            .with_message(format!("lost track of request: {}", message))
            .with_cause(err)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use settle_core::status::Status;

    use super::*;

    fn event(status: OperationStatus) -> ProgressEvent {
        ProgressEvent::builder().operation_status(status).build()
    }

    #[test]
    fn request_table_is_valid() {
        assert!(REQUEST_TABLE.validate().is_ok());
        assert!(REQUEST_TABLE.is_failure(&Status::from("CANCEL_COMPLETE")));
    }

    #[test]
    fn status_and_message_become_the_observation() {
        let failed = ProgressEvent::builder()
            .operation_status(OperationStatus::Failed)
            .error_code(HandlerErrorCode::InvalidRequest)
            .status_message("CidrBlock is invalid")
            .build();
        assert_eq!(
            observe(&failed),
            Observation::found("FAILED").with_reason(Some("CidrBlock is invalid"))
        );
        assert_eq!(
            observe(&event(OperationStatus::InProgress)),
            Observation::found("IN_PROGRESS")
        );
    }

    #[test]
    fn failed_with_not_found_means_gone() {
        let gone = ProgressEvent::builder()
            .operation_status(OperationStatus::Failed)
            .error_code(HandlerErrorCode::NotFound)
            .build();
        assert_eq!(observe(&gone), Observation::NotFound);
    }

    #[test]
    fn transient_tracking_errors_are_not_retried() {
        let err = not_retryable(ProviderError::transient("throttled"));
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(not_retryable(ProviderError::not_found()).is_not_found());
    }
}
