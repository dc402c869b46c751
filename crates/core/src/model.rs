//! Wire model of the remote research job service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{ModelError, RemoteError, ServiceError};
use crate::id::JobId;

/// Remote job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote-supplied progress hint. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// Terminal payload of a completed research job.
///
/// Only `text` is interpreted; every other field the service returns
/// (citations, usage, ...) is kept in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ResearchResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: Map::new(),
        }
    }

    /// True when the payload carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.extra.is_empty()
    }
}

/// Body of a status query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl StatusResponse {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            result: None,
            error: None,
        }
    }

    pub fn with_progress(mut self, step: impl Into<String>, percentage: Option<f64>) -> Self {
        self.progress = Some(ProgressSnapshot {
            step: step.into(),
            percentage,
        });
        self
    }

    pub fn with_result(mut self, result: ResearchResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: RemoteError) -> Self {
        self.error = Some(error);
        self
    }
}

/// How much effort the remote service should spend on a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl core::str::FromStr for ResearchDepth {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(ResearchDepth::Quick),
            "standard" => Ok(ResearchDepth::Standard),
            "deep" => Ok(ResearchDepth::Deep),
            other => Err(ModelError::validation(format!("unknown research depth: {other}"))),
        }
    }
}

/// What a caller asks for. Tool configurations are forwarded as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    pub depth: Option<ResearchDepth>,
    pub tools: Vec<JsonValue>,
    pub developer_instructions: Option<String>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_depth(mut self, depth: ResearchDepth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_tool(mut self, tool: JsonValue) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_developer_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.developer_instructions = Some(instructions.into());
        self
    }

    /// Build the job creation body. Always requests background execution.
    pub fn to_create_request(&self) -> Result<CreateJobRequest, ModelError> {
        if self.query.trim().is_empty() {
            return Err(ModelError::validation("query must not be empty"));
        }

        Ok(CreateJobRequest {
            query: self.query.clone(),
            depth: self.depth.unwrap_or_default(),
            tools: if self.tools.is_empty() {
                None
            } else {
                Some(self.tools.clone())
            },
            developer_instructions: self.developer_instructions.clone(),
            background: true,
        })
    }
}

/// Job creation request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub query: String,
    pub depth: ResearchDepth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_instructions: Option<String>,
    pub background: bool,
}

/// What job creation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateJobResponse {
    /// The service answered synchronously; no polling needed.
    Completed(ResearchResult),
    /// The job was queued and must be polled.
    Queued { job_id: JobId, status: JobStatus },
}

impl CreateJobResponse {
    /// Classify a raw creation response body.
    ///
    /// A `text` field marks a synchronous result and wins over `jobId`.
    pub fn from_value(value: JsonValue) -> Result<Self, ServiceError> {
        if value.get("text").is_some() {
            let result: ResearchResult = serde_json::from_value(value)?;
            return Ok(CreateJobResponse::Completed(result));
        }

        let job_id = value
            .get("jobId")
            .and_then(JsonValue::as_str)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ServiceError::malformed("creation response has neither `text` nor `jobId`")
            })?;

        let status = match value.get("status") {
            Some(s) => serde_json::from_value(s.clone())?,
            None => JobStatus::Pending,
        };

        Ok(CreateJobResponse::Queued {
            job_id: JobId::new(job_id),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn create_request_always_backgrounds_and_omits_empty_fields() {
        let body = ResearchRequest::new("rust async runtimes")
            .to_create_request()
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["background"], true);
        assert_eq!(json["depth"], "standard");
        assert!(json.get("tools").is_none());
        assert!(json.get("developerInstructions").is_none());
    }

    #[test]
    fn create_request_carries_tools_and_instructions() {
        let body = ResearchRequest::new("q")
            .with_depth(ResearchDepth::Deep)
            .with_tool(json!({"type": "web_search"}))
            .with_developer_instructions("cite sources")
            .to_create_request()
            .unwrap();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["depth"], "deep");
        assert_eq!(json["tools"][0]["type"], "web_search");
        assert_eq!(json["developerInstructions"], "cite sources");
    }

    #[test]
    fn blank_query_is_rejected() {
        let err = ResearchRequest::new("  ").to_create_request().unwrap_err();
        assert!(matches!(err, ModelError::Validation(_)));
    }

    #[test]
    fn creation_response_with_text_is_synchronous() {
        let resp = CreateJobResponse::from_value(json!({"text": "done", "citations": []})).unwrap();
        match resp {
            CreateJobResponse::Completed(result) => {
                assert_eq!(result.text, "done");
                assert!(result.extra.contains_key("citations"));
            }
            other => panic!("expected synchronous result, got {other:?}"),
        }
    }

    #[test]
    fn creation_response_with_job_id_is_queued() {
        let resp =
            CreateJobResponse::from_value(json!({"jobId": "job_1", "status": "pending"})).unwrap();
        assert_eq!(
            resp,
            CreateJobResponse::Queued {
                job_id: JobId::new("job_1"),
                status: JobStatus::Pending
            }
        );
    }

    #[test]
    fn creation_response_without_either_is_malformed() {
        let err = CreateJobResponse::from_value(json!({"status": "pending"})).unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn status_response_parses_full_shape() {
        let resp: StatusResponse = serde_json::from_value(json!({
            "status": "processing",
            "progress": {"step": "searching", "percentage": 40.0}
        }))
        .unwrap();
        assert_eq!(resp.status, JobStatus::Processing);
        assert_eq!(resp.progress.unwrap().step, "searching");
        assert!(resp.result.is_none());
    }

    #[test]
    fn empty_result_object_is_detected() {
        let resp: StatusResponse =
            serde_json::from_value(json!({"status": "completed", "result": {}})).unwrap();
        assert!(resp.result.unwrap().is_empty());
    }

    #[test]
    fn depth_parses_case_insensitively() {
        assert_eq!("DEEP".parse::<ResearchDepth>().unwrap(), ResearchDepth::Deep);
        assert!("extreme".parse::<ResearchDepth>().is_err());
    }
}
