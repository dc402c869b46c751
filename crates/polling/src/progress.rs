//! Per-cycle progress reporting.
//!
//! A reporter is invoked once per successful poll cycle, including the cycle
//! that observes a terminal status. Errors returned by a reporter are logged
//! and swallowed: a broken progress sink never aborts a research job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use delve_core::{JobId, JobStatus, ProgressSnapshot, SessionId};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Snapshot handed to reporters after each status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub session_id: SessionId,
    pub job_id: JobId,
    pub status: JobStatus,
    pub elapsed_time_ms: u64,
    /// 1-based index of the poll cycle that produced this update.
    pub poll_count: u32,
    pub progress: Option<ProgressSnapshot>,
    pub observed_at: DateTime<Utc>,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()>;
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressUpdate) -> anyhow::Result<()> + Send + Sync,
{
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        self(update)
    }
}

/// Logs every update at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        info!(
            session_id = %update.session_id,
            job_id = %update.job_id,
            status = %update.status,
            poll_count = update.poll_count,
            elapsed_ms = update.elapsed_time_ms,
            step = update.progress.as_ref().map(|p| p.step.as_str()),
            percentage = update.progress.as_ref().and_then(|p| p.percentage),
            "research progress"
        );
        Ok(())
    }
}

/// Publishes the latest update into a `watch` channel.
#[derive(Debug, Clone)]
pub struct WatchReporter {
    tx: watch::Sender<Option<ProgressUpdate>>,
}

impl WatchReporter {
    pub fn new() -> (Self, watch::Receiver<Option<ProgressUpdate>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl ProgressReporter for WatchReporter {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        // Having no subscribers left is not a failure.
        self.tx.send_replace(Some(update.clone()));
        Ok(())
    }
}

/// Forwards each update to several reporters, in order.
///
/// Every reporter sees every update; the first error is returned after all
/// have been called.
#[derive(Clone, Default)]
pub struct Fanout {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl ProgressReporter for Fanout {
    fn report(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        let mut first_err = None;
        for reporter in &self.reporters {
            if let Err(e) = reporter.report(update) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("reporters", &self.reporters.len())
            .finish()
    }
}
