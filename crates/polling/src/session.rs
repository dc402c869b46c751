//! The polling state machine.
//!
//! ```text
//! SUBMITTING -> WAITING_INITIAL -> POLLING -> COMPLETED | FAILED | TIMED_OUT | CANCELLED
//! ```
//!
//! One [`PollingSession`] drives one job from submission (or resumption) to a
//! terminal state. Its [`PollingState`] lives on the session's own stack and is
//! never shared, so independent sessions can run concurrently without locking.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use delve_core::{
    CreateJobResponse, ErrorCode, JobId, JobStatus, PollingError, ResearchRequest,
    ResearchResult, ServiceError, SessionId, StatusResponse,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::next_interval;
use crate::clock::Clock;
use crate::config::PollingConfig;
use crate::delay::cancellable_delay;
use crate::fetcher::StatusFetcher;
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::service::RemoteJobService;

/// Named states of a polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Submitting,
    WaitingInitial,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::TimedOut
                | SessionState::Cancelled
        )
    }

    fn for_error(err: &PollingError) -> Self {
        match err.code {
            ErrorCode::Cancelled => SessionState::Cancelled,
            ErrorCode::PollingTimeout => SessionState::TimedOut,
            _ => SessionState::Failed,
        }
    }
}

/// How a session obtains its job.
#[derive(Debug, Clone)]
pub enum SessionStart {
    /// Create a new remote job from a request.
    Submit(ResearchRequest),
    /// Poll a job created earlier, without submitting again.
    Resume(JobId),
}

/// Mutable bookkeeping of one session. Owned by the loop, never aliased.
#[derive(Debug)]
struct PollingState {
    start_time: Instant,
    current_interval: Duration,
    poll_count: u32,
    consecutive_network_failures: u32,
}

/// Result of one poll cycle.
enum Cycle {
    Continue,
    Done(Result<ResearchResult, PollingError>),
}

pub struct PollingSession {
    id: SessionId,
    service: Arc<dyn RemoteJobService>,
    clock: Arc<dyn Clock>,
    fetcher: StatusFetcher,
    config: PollingConfig,
    token: CancellationToken,
    reporter: Option<Arc<dyn ProgressReporter>>,
    state: SessionState,
}

impl PollingSession {
    pub fn new(
        service: Arc<dyn RemoteJobService>,
        clock: Arc<dyn Clock>,
        config: PollingConfig,
        token: CancellationToken,
    ) -> Self {
        let fetcher = StatusFetcher::from_config(service.clone(), clock.clone(), &config);
        Self {
            id: SessionId::new(),
            service,
            clock,
            fetcher,
            config,
            token,
            reporter: None,
            state: SessionState::Submitting,
        }
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to a terminal state.
    #[tracing::instrument(name = "polling_session", skip_all, fields(session_id = %self.id, job_id = tracing::field::Empty))]
    pub async fn run(mut self, start: SessionStart) -> Result<ResearchResult, PollingError> {
        let outcome = self.drive(start).await;
        let terminal = match &outcome {
            Ok(_) => SessionState::Completed,
            Err(err) => SessionState::for_error(err),
        };
        self.transition(terminal);

        match &outcome {
            Ok(_) => info!("research job completed"),
            Err(err) => info!(code = %err.code, error = %err.message, "research job ended"),
        }
        outcome
    }

    async fn drive(&mut self, start: SessionStart) -> Result<ResearchResult, PollingError> {
        self.config
            .validate()
            .map_err(|e| PollingError::invalid_request(e.to_string()))?;

        let job_id = match start {
            SessionStart::Submit(request) => match self.submit(&request).await? {
                CreateJobResponse::Completed(result) => {
                    debug!("job completed synchronously, skipping polling");
                    return Ok(result);
                }
                CreateJobResponse::Queued { job_id, .. } => job_id,
            },
            SessionStart::Resume(job_id) => job_id,
        };

        info!(job_id = %job_id, "polling research job");
        tracing::Span::current().record("job_id", tracing::field::display(&job_id));

        let mut state = PollingState {
            start_time: self.clock.now(),
            current_interval: self.config.initial_interval,
            poll_count: 0,
            consecutive_network_failures: 0,
        };

        // The first wait counts against the budget like any other.
        let initial_wait = self.config.initial_interval.min(self.config.max_duration);
        self.transition(SessionState::WaitingInitial);
        cancellable_delay(self.clock.as_ref(), initial_wait, Some(&self.token))
            .await
            .map_err(|e| e.with_job_id(job_id.clone()))?;

        self.transition(SessionState::Polling);
        loop {
            if let Cycle::Done(outcome) = self.poll_cycle(&job_id, &mut state).await {
                return outcome;
            }
        }
    }

    async fn submit(&mut self, request: &ResearchRequest) -> Result<CreateJobResponse, PollingError> {
        self.transition(SessionState::Submitting);

        let body = request
            .to_create_request()
            .map_err(|e| PollingError::invalid_request(e.to_string()))?;

        if self.token.is_cancelled() {
            return Err(PollingError::cancelled());
        }

        // Job creation is not idempotent, so it is never retried here.
        match self.service.create_job(&body).await {
            Ok(response) => Ok(response),
            Err(ServiceError::Api(err)) => Err(err),
            Err(err) => Err(PollingError::network(format!(
                "Failed to create research job: {err}"
            ))),
        }
    }

    async fn poll_cycle(&mut self, job_id: &JobId, state: &mut PollingState) -> Cycle {
        let elapsed = self.elapsed_ms(state);
        if elapsed >= duration_ms(self.config.max_duration) {
            warn!(job_id = %job_id, elapsed_ms = elapsed, "polling budget exhausted");
            return Cycle::Done(Err(timeout(job_id, elapsed)));
        }

        if self.token.is_cancelled() {
            return Cycle::Done(Err(PollingError::cancelled().with_job_id(job_id.clone())));
        }

        state.poll_count += 1;
        debug!(job_id = %job_id, poll_count = state.poll_count, elapsed_ms = elapsed, "polling job status");

        match self.fetcher.fetch(job_id, &self.token).await {
            Ok(response) => {
                state.consecutive_network_failures = 0;
                self.report(job_id, state, &response);
                if let Some(outcome) = terminal_outcome(job_id, response) {
                    return Cycle::Done(outcome);
                }
            }
            Err(err) if err.code == ErrorCode::Network => {
                state.consecutive_network_failures += 1;
                if let Some(limit) = self.config.max_consecutive_network_failures {
                    if state.consecutive_network_failures >= limit {
                        return Cycle::Done(Err(err));
                    }
                }
                warn!(
                    job_id = %job_id,
                    consecutive_failures = state.consecutive_network_failures,
                    error = %err.message,
                    "poll cycle failed, backing off"
                );
            }
            Err(err) => return Cycle::Done(Err(err)),
        }

        state.current_interval = next_interval(state.current_interval, self.config.max_interval);

        let elapsed = self.elapsed_ms(state);
        let remaining = duration_ms(self.config.max_duration).saturating_sub(elapsed);
        if remaining == 0 {
            warn!(job_id = %job_id, elapsed_ms = elapsed, "no time left for another poll");
            return Cycle::Done(Err(timeout(job_id, elapsed)));
        }
        let wait = state.current_interval.min(Duration::from_millis(remaining));

        debug!(job_id = %job_id, interval_ms = duration_ms(wait), "waiting before next poll");
        match cancellable_delay(self.clock.as_ref(), wait, Some(&self.token)).await {
            Ok(()) => Cycle::Continue,
            Err(err) => Cycle::Done(Err(err.with_job_id(job_id.clone()))),
        }
    }

    fn report(&self, job_id: &JobId, state: &PollingState, response: &StatusResponse) {
        let Some(reporter) = &self.reporter else {
            return;
        };

        let update = ProgressUpdate {
            session_id: self.id,
            job_id: job_id.clone(),
            status: response.status,
            elapsed_time_ms: self.elapsed_ms(state),
            poll_count: state.poll_count,
            progress: response.progress.clone(),
            observed_at: Utc::now(),
        };

        if let Err(e) = reporter.report(&update) {
            warn!(job_id = %job_id, error = %e, "progress reporter failed; continuing");
        }
    }

    fn elapsed_ms(&self, state: &PollingState) -> u64 {
        duration_ms(self.clock.now().saturating_duration_since(state.start_time))
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state transition");
            self.state = next;
        }
    }
}

impl std::fmt::Debug for PollingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Map a terminal status to the session outcome; `None` for non-terminal.
fn terminal_outcome(
    job_id: &JobId,
    response: StatusResponse,
) -> Option<Result<ResearchResult, PollingError>> {
    match response.status {
        JobStatus::Completed => Some(match response.result {
            Some(result) if !result.is_empty() => Ok(result),
            _ => Err(PollingError::api("Research job completed but no result returned")
                .with_job_id(job_id.clone())),
        }),
        JobStatus::Failed => {
            let remote = response.error.unwrap_or_default();
            Some(Err(PollingError::from_remote(&remote, "Research job failed", false)
                .with_job_id(job_id.clone())))
        }
        JobStatus::Pending | JobStatus::Processing => None,
    }
}

fn timeout(job_id: &JobId, elapsed_ms: u64) -> PollingError {
    PollingError::timeout(elapsed_ms).with_job_id(job_id.clone())
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
