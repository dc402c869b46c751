//! HttpJobService against an in-process fake research service.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use delve_client::{ClientConfig, HttpJobService};
use delve_core::{
    CreateJobResponse, ErrorCode, JobId, JobStatus, ResearchDepth, ResearchRequest, ServiceError,
};
use delve_polling::{Poller, PollingConfig, RemoteJobService, SessionOptions};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Script {
    creates: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    statuses: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
    polled: Arc<Mutex<Vec<String>>>,
}

impl Script {
    fn on_create(&self, status: StatusCode, body: Value) -> &Self {
        self.creates
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
        self
    }

    fn on_status(&self, status: StatusCode, body: impl Into<String>) -> &Self {
        self.statuses
            .lock()
            .unwrap()
            .push_back((status, body.into()));
        self
    }
}

async fn create(
    State(script): State<Script>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    script.bodies.lock().unwrap().push(body);
    script.auth.lock().unwrap().push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    script
        .creates
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::OK, json!({"jobId": "job_1", "status": "pending"}).to_string()))
}

async fn status(State(script): State<Script>, Path(id): Path<String>) -> (StatusCode, String) {
    script.polled.lock().unwrap().push(id);
    script
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::OK, json!({"status": "pending"}).to_string()))
}

struct TestServer {
    base_url: String,
    script: Script,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let script = Script::default();
        let routes = Router::new()
            .route("/research", post(create))
            .route("/research/:id", get(status))
            .with_state(script.clone());
        let app = Router::new().nest("/v1", routes);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/v1"),
            script,
            handle,
        }
    }

    fn service(&self) -> HttpJobService {
        HttpJobService::new(ClientConfig::new(&self.base_url).unwrap()).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn request() -> ResearchRequest {
    ResearchRequest::new("history of the transistor").with_depth(ResearchDepth::Deep)
}

#[tokio::test]
async fn create_posts_camel_case_body_with_bearer_auth() {
    let server = TestServer::spawn().await;
    let service = HttpJobService::new(
        ClientConfig::new(&server.base_url)
            .unwrap()
            .with_api_key("sk-test"),
    )
    .unwrap();
    let body = request()
        .with_developer_instructions("be brief")
        .to_create_request()
        .unwrap();

    let response = service.create_job(&body).await.unwrap();

    assert_eq!(
        response,
        CreateJobResponse::Queued {
            job_id: JobId::new("job_1"),
            status: JobStatus::Pending
        }
    );
    let sent = server.script.bodies.lock().unwrap()[0].clone();
    assert_eq!(sent["query"], "history of the transistor");
    assert_eq!(sent["depth"], "deep");
    assert_eq!(sent["background"], true);
    assert_eq!(sent["developerInstructions"], "be brief");
    assert!(sent.get("tools").is_none());
    assert_eq!(
        server.script.auth.lock().unwrap()[0].as_deref(),
        Some("Bearer sk-test")
    );
}

#[tokio::test]
async fn create_without_key_sends_no_authorization() {
    let server = TestServer::spawn().await;

    server
        .service()
        .create_job(&request().to_create_request().unwrap())
        .await
        .unwrap();

    assert_eq!(server.script.auth.lock().unwrap()[0], None);
}

#[tokio::test]
async fn create_can_complete_synchronously() {
    let server = TestServer::spawn().await;
    server.script.on_create(
        StatusCode::OK,
        json!({"text": "short answer", "citations": ["a"]}),
    );

    let response = server
        .service()
        .create_job(&request().to_create_request().unwrap())
        .await
        .unwrap();

    match response {
        CreateJobResponse::Completed(result) => {
            assert_eq!(result.text, "short answer");
            assert_eq!(result.extra["citations"], json!(["a"]));
        }
        other => panic!("expected synchronous result, got {other:?}"),
    }
}

#[tokio::test]
async fn status_is_read_from_the_job_path() {
    let server = TestServer::spawn().await;
    server.script.on_status(
        StatusCode::OK,
        json!({"status": "processing", "progress": {"step": "searching", "percentage": 25.0}})
            .to_string(),
    );

    let response = server.service().job_status(&JobId::new("job_7")).await.unwrap();

    assert_eq!(response.status, JobStatus::Processing);
    let progress = response.progress.unwrap();
    assert_eq!(progress.step, "searching");
    assert_eq!(progress.percentage, Some(25.0));
    assert_eq!(*server.script.polled.lock().unwrap(), vec!["job_7".to_string()]);
}

#[tokio::test]
async fn structured_client_error_is_authoritative() {
    let server = TestServer::spawn().await;
    server.script.on_status(
        StatusCode::NOT_FOUND,
        json!({"error": {"code": "JOB_NOT_FOUND", "message": "unknown job", "retryable": false}})
            .to_string(),
    );

    let err = server
        .service()
        .job_status(&JobId::new("gone"))
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    match err {
        ServiceError::Api(e) => {
            assert_eq!(e.code.as_str(), "JOB_NOT_FOUND");
            assert_eq!(e.message, "unknown job");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = TestServer::spawn().await;
    server.script.on_status(StatusCode::SERVICE_UNAVAILABLE, "upstream down");

    let err = server
        .service()
        .job_status(&JobId::new("job_1"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    match err {
        ServiceError::Api(e) => assert_eq!(e.code, ErrorCode::Network),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn structured_server_error_stops_the_poller() {
    let server = TestServer::spawn().await;
    server.script.on_status(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": {"code": "JOB_QUOTA", "message": "quota db down", "retryable": false}})
            .to_string(),
    );

    let config = PollingConfig::default()
        .with_initial_interval(Duration::from_millis(10))
        .with_max_interval(Duration::from_millis(40))
        .with_max_duration(Duration::from_secs(10))
        .with_fetch_retries(4, Duration::from_millis(5));
    let poller = Poller::new(Arc::new(server.service())).with_config(config);

    let err = poller
        .research(&request(), SessionOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code.as_str(), "JOB_QUOTA");
    assert_eq!(err.message, "quota db down");
    assert!(!err.retryable);
    assert_eq!(err.job_id, Some(JobId::new("job_1")));
    assert_eq!(server.script.polled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unparseable_body_is_malformed() {
    let server = TestServer::spawn().await;
    server.script.on_status(StatusCode::OK, "<html>gateway</html>");

    let err = server
        .service()
        .job_status(&JobId::new("job_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Malformed(_)));
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let service = HttpJobService::new(
        ClientConfig::new(&format!("http://{addr}"))
            .unwrap()
            .with_request_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let err = service.job_status(&JobId::new("job_1")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Transport(_)));
}

#[tokio::test]
async fn poller_drives_a_job_over_http() {
    let server = TestServer::spawn().await;
    server
        .script
        .on_status(StatusCode::OK, json!({"status": "pending"}).to_string())
        .on_status(StatusCode::BAD_GATEWAY, "")
        .on_status(StatusCode::OK, json!({"status": "processing"}).to_string())
        .on_status(
            StatusCode::OK,
            json!({"status": "completed", "result": {"text": "the transistor was invented in 1947"}})
                .to_string(),
        );

    let config = PollingConfig::default()
        .with_initial_interval(Duration::from_millis(10))
        .with_max_interval(Duration::from_millis(40))
        .with_max_duration(Duration::from_secs(10))
        .with_fetch_retries(4, Duration::from_millis(5));
    let poller = Poller::new(Arc::new(server.service())).with_config(config);

    let result = poller
        .research(&request(), SessionOptions::new())
        .await
        .unwrap();

    assert_eq!(result.text, "the transistor was invented in 1947");
    assert_eq!(server.script.polled.lock().unwrap().len(), 4);
}
