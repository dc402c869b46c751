//! Entry points for running research sessions.

use std::sync::Arc;

use delve_core::{JobId, PollingError, ResearchRequest, ResearchResult, SessionId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, TokioClock};
use crate::config::PollingConfig;
use crate::progress::{Fanout, ProgressReporter, ProgressUpdate, WatchReporter};
use crate::service::RemoteJobService;
use crate::session::{PollingSession, SessionStart};

/// Per-call options: cancellation and progress sinks.
#[derive(Clone, Default)]
pub struct SessionOptions {
    token: Option<CancellationToken>,
    reporters: Fanout,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn on_progress<F>(self, callback: F) -> Self
    where
        F: Fn(&ProgressUpdate) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_reporter(Arc::new(callback))
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters = self.reporters.with(reporter);
        self
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("cancellable", &self.token.is_some())
            .field("reporters", &self.reporters.len())
            .finish()
    }
}

/// Runs research jobs against one remote service.
///
/// A `Poller` holds no per-job state; each call builds its own session, so it
/// can be cloned and used from many tasks at once.
#[derive(Clone)]
pub struct Poller {
    service: Arc<dyn RemoteJobService>,
    clock: Arc<dyn Clock>,
    config: PollingConfig,
}

impl Poller {
    pub fn new(service: Arc<dyn RemoteJobService>) -> Self {
        Self {
            service,
            clock: Arc::new(TokioClock),
            config: PollingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PollingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    /// Submit a research job and poll it to completion.
    pub async fn research(
        &self,
        request: &ResearchRequest,
        options: SessionOptions,
    ) -> Result<ResearchResult, PollingError> {
        self.session(SessionId::new(), options)
            .run(SessionStart::Submit(request.clone()))
            .await
    }

    /// Poll a job submitted earlier, e.g. after a process restart.
    pub async fn resume(
        &self,
        job_id: JobId,
        options: SessionOptions,
    ) -> Result<ResearchResult, PollingError> {
        self.session(SessionId::new(), options)
            .run(SessionStart::Resume(job_id))
            .await
    }

    /// Run a research session on its own task.
    pub fn spawn(&self, request: ResearchRequest, options: SessionOptions) -> SessionHandle {
        self.spawn_session(SessionStart::Submit(request), options)
    }

    /// Resume polling a known job on its own task.
    pub fn spawn_resume(&self, job_id: JobId, options: SessionOptions) -> SessionHandle {
        self.spawn_session(SessionStart::Resume(job_id), options)
    }

    fn spawn_session(&self, start: SessionStart, options: SessionOptions) -> SessionHandle {
        let token = options.token.clone().unwrap_or_default();
        let (watcher, progress) = WatchReporter::new();
        let options = SessionOptions {
            token: Some(token.clone()),
            ..options
        }
        .with_reporter(Arc::new(watcher));

        let session_id = SessionId::new();
        let session = self.session(session_id, options);
        let join = tokio::spawn(session.run(start));

        SessionHandle {
            session_id,
            token,
            progress,
            join,
        }
    }

    fn session(&self, id: SessionId, options: SessionOptions) -> PollingSession {
        let token = options.token.unwrap_or_default();
        let session = PollingSession::new(
            self.service.clone(),
            self.clock.clone(),
            self.config.clone(),
            token,
        )
        .with_id(id);

        if options.reporters.is_empty() {
            session
        } else {
            session.with_reporter(Arc::new(options.reporters))
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a session running on its own task.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: SessionId,
    token: CancellationToken,
    progress: watch::Receiver<Option<ProgressUpdate>>,
    join: JoinHandle<Result<ResearchResult, PollingError>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Request cancellation. The session stops at its next suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Latest progress update, refreshed after every successful poll.
    pub fn progress(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the session's outcome.
    pub async fn join(self) -> Result<ResearchResult, PollingError> {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(PollingError::cancelled()),
            Err(e) => Err(PollingError::internal(format!(
                "polling task panicked: {e}"
            ))),
        }
    }
}
