#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{QueueError, QueueFuture, WorkQueue};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use db::DbConfig;
use ingest_core::{Job, JobEvent, JobId, JobResult, PipelineConfig, QueueStats};
use serde_json::{Value, json};
use server::{AppState, Pipeline, router};
use storage::{Storage, StorageConfig};
use tokio::sync::broadcast;
use tower::ServiceExt;

type TestResult = Result<(), Box<dyn Error>>;

const BOUNDARY: &str = "----ingest-test-boundary";
const USERS_CSV: &str = "name,email\nAlice,alice@x.com\n,bob@x.com\nCarol,carol@x.com\n";

/// Records enqueued jobs; optionally refuses every enqueue.
struct RecordingQueue {
    refuse: bool,
    jobs: Mutex<Vec<Job>>,
    events: broadcast::Sender<JobEvent>,
}

impl RecordingQueue {
    fn new(refuse: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            refuse,
            jobs: Mutex::new(Vec::new()),
            events,
        })
    }
}

impl WorkQueue for RecordingQueue {
    fn enqueue(&self, job_type: &str, payload: Value) -> QueueFuture<'_, Job> {
        let job_type = job_type.to_string();
        Box::pin(async move {
            if self.refuse {
                return Err(QueueError::Unavailable("store offline".into()));
            }
            let job = Job::new("userQueue", job_type, payload);
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job)
        })
    }

    fn claim(&self, _worker_id: &str, _timeout: Option<Duration>) -> QueueFuture<'_, Option<Job>> {
        Box::pin(async { Ok(None) })
    }

    fn complete(&self, job_id: JobId, _result: JobResult) -> QueueFuture<'_, Job> {
        Box::pin(async move { Err(QueueError::NotFound(job_id)) })
    }

    fn fail(&self, job_id: JobId, _reason: &str) -> QueueFuture<'_, Job> {
        Box::pin(async move { Err(QueueError::NotFound(job_id)) })
    }

    fn get(&self, job_id: JobId) -> QueueFuture<'_, Option<Job>> {
        Box::pin(async move {
            Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == job_id).cloned())
        })
    }

    fn stats(&self) -> QueueFuture<'_, QueueStats> {
        Box::pin(async move {
            Ok(QueueStats {
                waiting: self.jobs.lock().unwrap().len() as u64,
                ..QueueStats::default()
            })
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

fn app(uploads: Storage, queue: Arc<RecordingQueue>) -> Router {
    router(AppState::new(&PipelineConfig::default(), uploads, queue))
}

fn multipart_body(field: &str, filename: &str, content: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    )
}

fn upload_request(body: String) -> Result<Request<Body>, axum::http::Error> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
}

fn json_request(method: &str, uri: &str, body: Value) -> Result<Request<Body>, axum::http::Error> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
}

fn get(uri: &str) -> Result<Request<Body>, axum::http::Error> {
    Request::builder().uri(uri).body(Body::empty())
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

#[tokio::test]
async fn test_upload_stores_file_and_enqueues_filename() -> TestResult {
    let dir = tempfile::tempdir()?;
    let uploads = Storage::new(StorageConfig::filesystem(dir.path()))?;
    let queue = RecordingQueue::new(false);
    let app = app(uploads, queue.clone());

    let (status, body) = send(
        &app,
        upload_request(multipart_body("csvfile", "users.csv", USERS_CSV))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File uploaded successfully and added to queue.");

    let filename = body["filename"].as_str().ok_or("missing filename")?;
    assert!(filename.ends_with("-users.csv"));
    assert_eq!(std::fs::read_to_string(dir.path().join(filename))?, USERS_CSV);

    let jobs = queue.jobs.lock().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, "process_csv");
    assert_eq!(jobs[0].payload, json!({ "filename": filename }));
    assert_eq!(body["job_id"], json!(jobs[0].id));
    Ok(())
}

#[tokio::test]
async fn test_upload_creates_missing_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("uploads");
    let uploads = Storage::new(StorageConfig::filesystem(&root))?;
    std::fs::remove_dir(&root)?;
    let app = app(uploads, RecordingQueue::new(false));

    let (status, _) = send(
        &app,
        upload_request(multipart_body("csvfile", "users.csv", USERS_CSV))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(std::fs::read_dir(&root)?.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_upload_directory_exists_before_the_body_is_read() -> TestResult {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("uploads");
    let uploads = Storage::new(StorageConfig::filesystem(&root))?;
    std::fs::remove_dir(&root)?;
    let app = app(uploads, RecordingQueue::new(false));

    // Rejected for the missing file, after the directory was prepared.
    let (status, _) = send(
        &app,
        upload_request(multipart_body("attachment", "users.csv", USERS_CSV))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(root.is_dir());
    assert_eq!(std::fs::read_dir(&root)?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() -> TestResult {
    let queue = RecordingQueue::new(false);
    let app = app(Storage::new(StorageConfig::memory())?, queue.clone());

    let (status, body) = send(
        &app,
        upload_request(multipart_body("attachment", "users.csv", USERS_CSV))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));

    let (status, _) = send(&app, json_request("POST", "/upload", json!({}))?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(queue.jobs.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_enqueue_removes_stored_file() -> TestResult {
    let dir = tempfile::tempdir()?;
    let uploads = Storage::new(StorageConfig::filesystem(dir.path()))?;
    let app = app(uploads, RecordingQueue::new(true));

    let (status, body) = send(
        &app,
        upload_request(multipart_body("csvfile", "users.csv", USERS_CSV))?,
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Job queue unavailable" }));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_wrong_method_is_405_json() -> TestResult {
    let app = app(Storage::new(StorageConfig::memory())?, RecordingQueue::new(false));

    let (status, body) = send(&app, get("/upload")?).await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({ "error": "Method Not Allowed" }));

    let (status, _) = send(&app, json_request("DELETE", "/progress", json!({}))?).await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}

#[tokio::test]
async fn test_progress_is_404_until_reported_then_verbatim() -> TestResult {
    let app = app(Storage::new(StorageConfig::memory())?, RecordingQueue::new(false));

    let (status, body) = send(&app, get("/progress")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "No parsed data available yet" }));

    let job_id = JobId::new().to_string();
    let reported = json!({
        "job_id": job_id,
        "status": "completed",
        "users": [{ "name": "Alice", "email": "alice@x.com" }],
        "discarded": 1,
        "extra": { "kept": true },
    });
    let (status, body) = send(&app, json_request("POST", "/progress", reported.clone())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Parsed data stored" }));

    let (_, latest) = send(&app, get("/progress")?).await?;
    assert_eq!(latest, reported);

    let (status, keyed) = send(&app, get(&format!("/progress/{job_id}"))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(keyed, reported);

    let (status, _) = send(&app, get("/progress/unknown")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_users_endpoint_drops_repeated_keys() -> TestResult {
    let app = app(Storage::new(StorageConfig::memory())?, RecordingQueue::new(false));
    let user = json!({ "name": "Alice", "email": "alice@x.com" });

    let keyed = || -> Result<Request<Body>, axum::http::Error> {
        Request::builder()
            .method("POST")
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .header("Idempotency-Key", "job-1:alice@x.com")
            .body(Body::from(user.to_string()))
    };

    let (status, body) = send(&app, keyed()?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "User processed successfully" }));

    let (status, body) = send(&app, keyed()?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], true);

    // Without a key every delivery is processed.
    let (_, body) = send(&app, json_request("POST", "/users", user.clone())?).await?;
    assert!(body.get("duplicate").is_none());

    let (status, body) = send(&app, json_request("POST", "/users", json!({ "name": "x" }))?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        json_request("POST", "/users/batch", json!([user, { "name": "Carol", "email": "carol@x.com" }]))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    Ok(())
}

/// A result for a file of 60k users is well past axum's default 2 MiB body cap.
#[tokio::test]
async fn test_large_results_and_batches_are_accepted() -> TestResult {
    let app = app(Storage::new(StorageConfig::memory())?, RecordingQueue::new(false));

    let users: Vec<Value> = (0..60_000)
        .map(|i| json!({ "name": format!("User {i}"), "email": format!("user{i}@example.com") }))
        .collect();
    let job_id = JobId::new().to_string();
    let result = json!({
        "job_id": job_id,
        "status": "completed",
        "users": users,
        "discarded": 0,
    });
    assert!(result.to_string().len() > 3 * 1024 * 1024);

    let (status, _) = send(&app, json_request("POST", "/progress", result.clone())?).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, latest) = send(&app, get("/progress")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["users"].as_array().map(Vec::len), Some(60_000));
    assert_eq!(latest["job_id"], json!(job_id));

    let (status, body) = send(&app, json_request("POST", "/users/batch", json!(users))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 60_000);
    Ok(())
}

#[tokio::test]
async fn test_job_inspection() -> TestResult {
    let queue = RecordingQueue::new(false);
    let app = app(Storage::new(StorageConfig::memory())?, queue.clone());

    let (status, _) = send(&app, get("/jobs/not-a-job-id")?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get(&format!("/jobs/{}", JobId::new()))?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let job = queue.enqueue("process_csv", json!({ "filename": "a.csv" })).await?;
    let (status, body) = send(&app, get(&format!("/jobs/{}", job.id))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["state"], "waiting");

    let (status, body) = send(&app, get("/queue/stats")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "waiting": 1, "active": 0, "completed": 0, "failed": 0 })
    );
    Ok(())
}

/// Upload through a real listener with an embedded worker and poll for the result.
#[tokio::test]
async fn test_pipeline_end_to_end() -> TestResult {
    let dir = tempfile::tempdir()?;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);

    let upload_dir = dir.path().to_string_lossy().to_string();
    let downstream = base.clone();
    let config = PipelineConfig::from_lookup(|key| match key {
        "UPLOAD_DIR" => Some(upload_dir.clone()),
        "DOWNSTREAM_URL" => Some(downstream.clone()),
        "EMBEDDED_WORKERS" => Some("1".to_string()),
        _ => None,
    })?;

    let db = db::init(&DbConfig::memory()).await?;
    let pipeline = Pipeline::start(&config, db).await?;
    let app = pipeline.router.clone();
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let client = reqwest::Client::new();
    let form = reqwest::multipart::Form::new().part(
        "csvfile",
        reqwest::multipart::Part::bytes(USERS_CSV.as_bytes().to_vec()).file_name("users.csv"),
    );
    let uploaded: Value = client
        .post(format!("{base}/upload"))
        .multipart(form)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let job_id = uploaded["job_id"].as_str().ok_or("missing job_id")?.to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let result: Value = loop {
        let response = client.get(format!("{base}/progress/{job_id}")).send().await?;
        if response.status().is_success() {
            break response.json().await?;
        }
        if tokio::time::Instant::now() > deadline {
            return Err("no result reported in time".into());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    assert_eq!(
        result,
        json!({
            "job_id": job_id,
            "status": "completed",
            "users": [
                { "name": "Alice", "email": "alice@x.com" },
                { "name": "Carol", "email": "carol@x.com" },
            ],
            "discarded": 1,
        })
    );

    let latest: Value = client.get(format!("{base}/progress")).send().await?.json().await?;
    assert_eq!(latest, result);

    // The report is posted before the job is marked completed.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job: Value = client.get(format!("{base}/jobs/{job_id}")).send().await?.json().await?;
        if job["status"]["state"] == "completed" {
            assert_eq!(job["status"]["result"]["output"]["forwarded"], 2);
            assert_eq!(job["status"]["result"]["output"]["discarded"], 1);
            break;
        }
        if tokio::time::Instant::now() > deadline {
            return Err(format!("job not completed: {job}").into());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    pipeline.shutdown().await;
    server.abort();
    Ok(())
}
