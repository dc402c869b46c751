//! Status query with bounded retry on transient failures.

use std::sync::Arc;
use std::time::Duration;

use delve_core::{JobId, PollingError, ServiceError, StatusResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::PollingConfig;
use crate::delay::cancellable_delay;
use crate::service::RemoteJobService;

/// One logical status read, retried on transient failures only.
///
/// Authoritative errors from the service are returned on the first attempt.
/// Connectivity failures, malformed bodies and `NETWORK`-coded service errors
/// are retried after a fixed pause, up to `attempts` tries in total.
#[derive(Clone)]
pub struct StatusFetcher {
    service: Arc<dyn RemoteJobService>,
    clock: Arc<dyn Clock>,
    attempts: u32,
    retry_delay: Duration,
}

impl StatusFetcher {
    pub fn new(service: Arc<dyn RemoteJobService>, clock: Arc<dyn Clock>) -> Self {
        let defaults = PollingConfig::default();
        Self {
            service,
            clock,
            attempts: defaults.fetch_attempts,
            retry_delay: defaults.fetch_retry_delay,
        }
    }

    pub fn with_retries(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn from_config(
        service: Arc<dyn RemoteJobService>,
        clock: Arc<dyn Clock>,
        config: &PollingConfig,
    ) -> Self {
        Self::new(service, clock).with_retries(config.fetch_attempts, config.fetch_retry_delay)
    }

    pub async fn fetch(
        &self,
        job_id: &JobId,
        token: &CancellationToken,
    ) -> Result<StatusResponse, PollingError> {
        let mut last_error: Option<ServiceError> = None;

        for attempt in 1..=self.attempts {
            if token.is_cancelled() {
                return Err(PollingError::cancelled().with_job_id(job_id.clone()));
            }

            match self.service.job_status(job_id).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(job_id = %job_id, attempt, "status query recovered");
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_transient() => {
                    return Err(PollingError::from(err).with_job_id(job_id.clone()));
                }
                Err(err) => {
                    warn!(
                        job_id = %job_id,
                        attempt,
                        max_attempts = self.attempts,
                        error = %err,
                        "status query failed"
                    );
                    last_error = Some(err);
                }
            }

            if attempt < self.attempts {
                cancellable_delay(self.clock.as_ref(), self.retry_delay, Some(token))
                    .await
                    .map_err(|e| e.with_job_id(job_id.clone()))?;
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(PollingError::network(format!(
            "Failed to fetch status for job {job_id} after {} attempts: {last}",
            self.attempts
        ))
        .with_job_id(job_id.clone()))
    }
}

impl std::fmt::Debug for StatusFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusFetcher")
            .field("attempts", &self.attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}
