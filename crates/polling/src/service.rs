//! Boundary to the remote research job service.

use std::sync::Arc;

use async_trait::async_trait;
use delve_core::{CreateJobRequest, CreateJobResponse, JobId, ServiceError, StatusResponse};

/// Remote job service as seen by the polling engine.
///
/// Implementations must classify failures through [`ServiceError`]: structured
/// errors the service reports are authoritative, everything else is treated as
/// transient by the status fetcher.
#[async_trait]
pub trait RemoteJobService: Send + Sync {
    /// Create a job. May complete synchronously.
    async fn create_job(&self, request: &CreateJobRequest)
    -> Result<CreateJobResponse, ServiceError>;

    /// Read the current state of a job. Must not mutate it.
    async fn job_status(&self, job_id: &JobId) -> Result<StatusResponse, ServiceError>;
}

#[async_trait]
impl<T: RemoteJobService + ?Sized> RemoteJobService for Arc<T> {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, ServiceError> {
        (**self).create_job(request).await
    }

    async fn job_status(&self, job_id: &JobId) -> Result<StatusResponse, ServiceError> {
        (**self).job_status(job_id).await
    }
}
