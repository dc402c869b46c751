//! `RemoteJobService` over HTTP.

use async_trait::async_trait;
use delve_core::{
    CreateJobRequest, CreateJobResponse, JobId, PollingError, RemoteError, ServiceError,
    StatusResponse,
};
use delve_polling::RemoteJobService;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ClientError};

/// HTTP client for the research job service.
///
/// * `POST {base}/research` creates a job.
/// * `GET {base}/research/{job_id}` reads its status.
#[derive(Clone)]
pub struct HttpJobService {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpJobService {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
            api_key: config.api_key,
        })
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::transport(format!("{} is not a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<String, ServiceError> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ServiceError::transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::transport(format!("failed to read response body: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            warn!(status = status.as_u16(), "research service returned an error status");
            Err(error_from_response(status, &body))
        }
    }
}

impl std::fmt::Debug for HttpJobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJobService")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteJobService for HttpJobService {
    async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, ServiceError> {
        let url = self.endpoint(&["research"])?;
        debug!(%url, depth = ?request.depth, "creating research job");

        let body = self.send(self.client.post(url).json(request)).await?;
        let value: Value = serde_json::from_str(&body)?;
        CreateJobResponse::from_value(value)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<StatusResponse, ServiceError> {
        let url = self.endpoint(&["research", job_id.as_str()])?;
        debug!(%url, "fetching research job status");

        let body = self.send(self.client.get(url)).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Classify a non-2xx response.
///
/// A structured code in the body is the service's final word and is kept
/// verbatim; 5xx and 429 only change its default retryability to `true`.
/// Without a code, 5xx and 429 are transient `NETWORK` failures unless the
/// body marks them non-retryable. Other statuses become `API_ERROR`.
pub fn error_from_response(status: StatusCode, body: &str) -> ServiceError {
    let remote = parse_error_body(body).unwrap_or_default();
    let server_class = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
    let fallback = if body.trim().is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body.trim())
    };

    let has_code = remote
        .code
        .as_deref()
        .is_some_and(|code| !code.trim().is_empty());
    if server_class && !has_code && remote.retryable != Some(false) {
        let message = remote
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback);
        return ServiceError::Api(PollingError::network(message));
    }

    ServiceError::Api(PollingError::from_remote(&remote, &fallback, server_class))
}

/// Accepts `{"error": {...}}` or a bare `{"code", "message", "retryable"}`.
fn parse_error_body(body: &str) -> Option<RemoteError> {
    let value: Value = serde_json::from_str(body).ok()?;
    let detail = match value.get("error") {
        Some(Value::String(message)) => {
            return Some(RemoteError {
                message: Some(message.clone()),
                ..RemoteError::default()
            });
        }
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value.clone(),
    };
    let remote: RemoteError = serde_json::from_value(detail).ok()?;
    if remote == RemoteError::default() {
        None
    } else {
        Some(remote)
    }
}
