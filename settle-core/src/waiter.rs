//! Poll-until-settled engine
//!
//! Repeatedly probes a resource's status on a fixed interval and interprets
//! each observation against a [`TransitionTable`] until the resource reaches
//! a target status, a failure status, disappears (delete waits), or the
//! timeout elapses. The caller's cancellation token is observed while
//! sleeping and while a probe is in flight.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, ProviderError, ProviderResult};
use crate::probe::{Observation, StatusProber};
use crate::status::Status;
use crate::transition::{NotFoundPolicy, TransitionTable};

/// Default interval between probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How a wait ended successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A target status was observed
    Reached { status: Status, probes: u32 },
    /// The resource no longer exists and the table treats that as settled
    Absent { probes: u32 },
}

impl Outcome {
    pub fn status(&self) -> Option<&Status> {
        match self {
            Outcome::Reached { status, .. } => Some(status),
            Outcome::Absent { .. } => None,
        }
    }

    pub fn probes(&self) -> u32 {
        match self {
            Outcome::Reached { probes, .. } | Outcome::Absent { probes } => *probes,
        }
    }
}

/// Drives a [`StatusProber`] until the resource settles
#[derive(Debug, Clone)]
pub struct Waiter {
    poll_interval: Duration,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Waiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `identifier` until it settles according to `table`
    ///
    /// `timeout` bounds the whole wait including the table's initial delay
    /// and any probe still in flight. A timeout too large to represent as an
    /// instant means no deadline.
    pub async fn wait_for<P>(
        &self,
        prober: &P,
        table: &TransitionTable,
        identifier: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<Outcome>
    where
        P: StatusProber + ?Sized,
    {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut last_status: Option<Status> = None;
        let mut probes: u32 = 0;
        let mut not_found_streak: u32 = 0;
        let mut target_streak: u32 = 0;

        if !table.delay.is_zero() {
            let delay = table.delay.min(timeout);
            sleep_or_cancel(delay, cancel, &last_status).await?;
        }

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(timed_out(identifier, started, probes, last_status));
            }

            probes += 1;
            let observation = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(cancelled(&last_status));
                }
                _ = until(deadline) => {
                    return Err(timed_out(identifier, started, probes, last_status));
                }
                result = prober.probe(identifier) => result?,
            };

            match observation {
                Observation::Found { status, reason } => {
                    not_found_streak = 0;
                    log::debug!("{}: probe {} observed {}", identifier, probes, status);

                    if table.is_target(&status) {
                        target_streak += 1;
                        if target_streak >= table.target_occurrences {
                            log::info!("{}: settled at {} after {} probes", identifier, status, probes);
                            return Ok(Outcome::Reached { status, probes });
                        }
                    } else {
                        target_streak = 0;
                        if table.is_failure(&status) {
                            return Err(ProviderError::new(ErrorKind::FailureState {
                                status,
                                reason,
                            }));
                        }
                        if !table.is_pending(&status) {
                            log::warn!(
                                "{}: unexpected status {}, continuing to poll",
                                identifier,
                                status
                            );
                        }
                    }
                    last_status = Some(status);
                }
                Observation::NotFound => {
                    target_streak = 0;
                    not_found_streak += 1;
                    log::debug!("{}: probe {} found nothing", identifier, probes);

                    match table.not_found {
                        NotFoundPolicy::Settle => {
                            log::info!("{}: gone after {} probes", identifier, probes);
                            return Ok(Outcome::Absent { probes });
                        }
                        NotFoundPolicy::Tolerate(limit) if not_found_streak > limit => {
                            return Err(ProviderError::not_found().with_message(format!(
                                "still missing after {} consecutive checks",
                                not_found_streak
                            )));
                        }
                        NotFoundPolicy::Tolerate(_) => {}
                    }
                }
            }

            let pause = match deadline {
                Some(deadline) => self
                    .poll_interval
                    .min(deadline.saturating_duration_since(Instant::now())),
                None => self.poll_interval,
            };
            sleep_or_cancel(pause, cancel, &last_status).await?;
        }
    }
}

/// Resolves at `deadline`, never if there is none
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn timed_out(
    identifier: &str,
    started: Instant,
    checks: u32,
    last_status: Option<Status>,
) -> ProviderError {
    log::warn!(
        "{}: timed out after {} status checks (last status: {:?})",
        identifier,
        checks,
        last_status
    );
    ProviderError::new(ErrorKind::Timeout {
        elapsed: started.elapsed(),
        last_status,
    })
}

async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
    last_status: &Option<Status>,
) -> ProviderResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(last_status)),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn cancelled(last_status: &Option<Status>) -> ProviderError {
    ProviderError::new(ErrorKind::Cancelled {
        last_status: last_status.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::provider::BoxFuture;

    const INTERVAL: Duration = Duration::from_secs(10);

    /// Replays a fixed sequence of observations, repeating the last one
    struct ScriptedProber {
        script: Mutex<VecDeque<ProviderResult<Observation>>>,
        last: Mutex<Option<Observation>>,
        calls: AtomicU32,
    }

    impl ScriptedProber {
        fn new(script: Vec<ProviderResult<Observation>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
            }
        }

        fn statuses(statuses: &[Option<&str>]) -> Self {
            Self::new(
                statuses
                    .iter()
                    .map(|s| {
                        Ok(match s {
                            Some(status) => Observation::found(*status),
                            None => Observation::NotFound,
                        })
                    })
                    .collect(),
            )
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusProber for ScriptedProber {
        fn probe<'a>(&'a self, _identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let result = match next {
                Some(Ok(observation)) => {
                    *self.last.lock().unwrap() = Some(observation.clone());
                    Ok(observation)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or(Observation::NotFound)),
            };
            Box::pin(async move { result })
        }
    }

    /// Never answers
    struct HangingProber;

    impl StatusProber for HangingProber {
        fn probe<'a>(&'a self, _identifier: &'a str) -> BoxFuture<'a, ProviderResult<Observation>> {
            Box::pin(std::future::pending())
        }
    }

    const CREATE: TransitionTable = TransitionTable::new(&["CREATING"], &["ACTIVE"])
        .failure(&["CREATE_FAILED"])
        .timeout(Duration::from_secs(50));

    const DELETE: TransitionTable = TransitionTable::deletion(&["DELETING"], &["DELETED"])
        .failure(&["DELETE_FAILED"])
        .timeout(Duration::from_secs(50));

    async fn run(
        prober: &ScriptedProber,
        table: &TransitionTable,
    ) -> ProviderResult<Outcome> {
        Waiter::new(INTERVAL)
            .wait_for(prober, table, "env-1,cluster-a", table.timeout, &CancellationToken::new())
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn create_wait_reaches_target_on_third_probe() {
        let prober = ScriptedProber::statuses(&[Some("CREATING"), Some("CREATING"), Some("ACTIVE")]);
        let started = Instant::now();

        let outcome = run(&prober, &CREATE).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Reached {
                status: Status::from("ACTIVE"),
                probes: 3
            }
        );
        assert_eq!(prober.calls(), 3);
        assert_eq!(started.elapsed(), INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_wait_settles_when_resource_disappears() {
        let prober = ScriptedProber::statuses(&[Some("DELETING"), None]);

        let outcome = run(&prober, &DELETE).await.unwrap();

        assert_eq!(outcome, Outcome::Absent { probes: 2 });
        assert_eq!(outcome.status(), None);
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_wait_accepts_target_status() {
        let prober = ScriptedProber::statuses(&[Some("DELETING"), Some("DELETED")]);
        let outcome = run(&prober, &DELETE).await.unwrap();
        assert_eq!(outcome.status(), Some(&Status::from("DELETED")));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_status_stops_after_one_probe() {
        let prober = ScriptedProber::new(vec![Ok(
            Observation::found("CREATE_FAILED").with_reason(Some("no capacity"))
        )]);

        let err = run(&prober, &CREATE).await.unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::FailureState {
                status: Status::from("CREATE_FAILED"),
                reason: Some("no capacity".to_string()),
            }
        );
        assert_eq!(prober.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_target() {
        let prober = ScriptedProber::statuses(&[Some("CREATING")]);
        let started = Instant::now();

        let err = run(&prober, &CREATE).await.unwrap_err();

        assert!(matches!(
            err.kind,
            ErrorKind::Timeout { ref last_status, .. } if last_status.as_ref() == Some(&Status::from("CREATING"))
        ));
        // probes at 0s, 10s, 20s, 30s, 40s; deadline at 50s
        assert_eq!(prober.calls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn success_iff_target_appears_before_deadline() {
        // five probes fit in the timeout; a target in position n succeeds iff n <= 5
        for position in 1..=7usize {
            let mut script = vec![Some("CREATING"); position - 1];
            script.push(Some("ACTIVE"));
            let prober = ScriptedProber::statuses(&script);

            let result = run(&prober, &CREATE).await;

            if position <= 5 {
                assert_eq!(result.unwrap().probes(), position as u32);
            } else {
                assert!(matches!(result.unwrap_err().kind, ErrorKind::Timeout { .. }));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_is_returned_immediately() {
        let prober = ScriptedProber::new(vec![
            Ok(Observation::found("CREATING")),
            Err(ProviderError::api("AccessDenied")),
            Ok(Observation::found("ACTIVE")),
        ]);

        let err = run(&prober, &CREATE).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Api);
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn create_wait_tolerates_read_after_write_lag() {
        let table = CREATE.not_found(NotFoundPolicy::Tolerate(2));
        let prober = ScriptedProber::statuses(&[None, None, Some("CREATING"), Some("ACTIVE")]);

        let outcome = run(&prober, &table).await.unwrap();

        assert_eq!(outcome.probes(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn create_wait_fails_when_not_found_exceeds_tolerance() {
        let table = CREATE.not_found(NotFoundPolicy::Tolerate(2));
        let prober = ScriptedProber::statuses(&[None]);

        let err = run(&prober, &table).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_status_keeps_polling() {
        let prober = ScriptedProber::statuses(&[Some("MAINTENANCE"), Some("ACTIVE")]);
        let outcome = run(&prober, &CREATE).await.unwrap();
        assert_eq!(outcome.probes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_target_occurrences_are_required() {
        let table = CREATE.target_occurrences(2);
        let prober = ScriptedProber::statuses(&[
            Some("ACTIVE"),
            Some("CREATING"),
            Some("ACTIVE"),
            Some("ACTIVE"),
        ]);

        let outcome = run(&prober, &table).await.unwrap();

        assert_eq!(outcome.probes(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_delay_postpones_first_probe() {
        let table = CREATE.delay(Duration::from_secs(30));
        let prober = ScriptedProber::statuses(&[Some("ACTIVE")]);
        let started = Instant::now();

        run(&prober, &table).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_within_one_interval() {
        let prober = ScriptedProber::statuses(&[Some("CREATING")]);
        let cancel = CancellationToken::new();
        let table = CREATE.timeout(Duration::from_secs(3600));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = Waiter::new(INTERVAL)
            .wait_for(&prober, &table, "env-1,cluster-a", table.timeout, &cancel)
            .await
            .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::Cancelled {
                last_status: Some(Status::from("CREATING"))
            }
        );
        assert!(started.elapsed() <= Duration::from_secs(25) + INTERVAL);
        assert_eq!(prober.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_hanging_probe() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let err = Waiter::new(INTERVAL)
            .wait_for(&HangingProber, &CREATE, "env-1", CREATE.timeout, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled { last_status: None });
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_status_call_times_out_at_deadline() {
        let started = Instant::now();

        let err = Waiter::new(INTERVAL)
            .wait_for(
                &HangingProber,
                &CREATE,
                "env-1",
                CREATE.timeout,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err.kind, ErrorKind::Timeout { last_status: None, .. }));
        assert_eq!(started.elapsed(), CREATE.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_means_no_deadline() {
        let prober = ScriptedProber::statuses(&[Some("CREATING"), Some("ACTIVE")]);

        let outcome = Waiter::new(INTERVAL)
            .wait_for(
                &prober,
                &CREATE,
                "env-1,cluster-a",
                Duration::from_secs(u64::MAX),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.probes(), 2);
    }
}
