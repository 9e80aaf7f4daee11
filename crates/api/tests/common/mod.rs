#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autotune_api::config::ServerConfig;
use autotune_api::router::build_app_router;
use autotune_api::state::AppState;
use autotune_cloud::{
    ArtifactStore, BatchScheduler, BlobRef, CloudError, JobSubmission, TaskStatus,
};
use autotune_core::naming::{is_secondary_artifact, INPUT_BLOB_NAME};
use autotune_notify::{EmailError, Mailer, OutgoingEmail};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

/// Shared secret configured for the completion callback in tests.
pub const CALLBACK_KEY: &str = "s3cret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        public_base_url: "https://tune.test".to_string(),
        results_callback_key: CALLBACK_KEY.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// In-memory scheduler recording every submission.
#[derive(Default)]
pub struct FakeScheduler {
    pub submissions: Mutex<Vec<JobSubmission>>,
    pub compute_status: Mutex<TaskStatus>,
    pub active_jobs: AtomicUsize,
    pub fail_status: AtomicBool,
}

impl FakeScheduler {
    pub fn set_compute_status(&self, status: TaskStatus) {
        *self.compute_status.lock().unwrap() = status;
    }

    pub fn submitted(&self) -> Vec<JobSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchScheduler for FakeScheduler {
    async fn submit(&self, submission: &JobSubmission) -> Result<usize, CloudError> {
        self.submissions.lock().unwrap().push(submission.clone());
        Ok(self.active_jobs.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn task_status(&self, _job_name: &str, _task_id: &str) -> Result<TaskStatus, CloudError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(CloudError::Api {
                status: 503,
                body: "scheduler unavailable".to_string(),
            });
        }
        Ok(self.compute_status.lock().unwrap().clone())
    }

    async fn active_job_count(&self) -> Result<usize, CloudError> {
        Ok(self.active_jobs.load(Ordering::SeqCst))
    }
}

/// In-memory blob store keyed by `(container, name)`.
#[derive(Default)]
pub struct FakeStore {
    pub containers: Mutex<BTreeSet<String>>,
    pub blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub fail_listing: AtomicBool,
}

impl FakeStore {
    pub fn put(&self, container: &str, name: &str, content: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert((container.to_string(), name.to_string()), content.to_vec());
    }

    pub fn get(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn create_container(&self, container: &str) -> Result<(), CloudError> {
        if !self.containers.lock().unwrap().insert(container.to_string()) {
            return Err(CloudError::ContainerExists(container.to_string()));
        }
        Ok(())
    }

    async fn stage_input(&self, container: &str, profile_json: &str) -> Result<String, CloudError> {
        self.put(container, INPUT_BLOB_NAME, profile_json.as_bytes());
        Ok(format!("https://store.test/{container}/{INPUT_BLOB_NAME}?sp=r"))
    }

    fn container_write_url(&self, container: &str) -> Result<String, CloudError> {
        Ok(format!("https://store.test/{container}?sp=rw"))
    }

    async fn list_secondary_artifacts(&self, container: &str) -> Result<Vec<BlobRef>, CloudError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(CloudError::Api {
                status: 403,
                body: "signature expired".to_string(),
            });
        }
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, name)| c == container && is_secondary_artifact(name))
            .map(|(c, name)| BlobRef::new(c.clone(), name.clone()))
            .collect())
    }

    async fn download(&self, blob: &BlobRef) -> Result<Vec<u8>, CloudError> {
        self.get(&blob.container, &blob.name).ok_or_else(|| CloudError::Api {
            status: 404,
            body: format!("BlobNotFound: {}", blob.name),
        })
    }
}

/// Mailer that keeps every email it is asked to send.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: AtomicBool,
    /// Simulated relay latency.
    pub delay: Mutex<Option<Duration>>,
}

impl FakeMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::Build("relay refused message".to_string()));
        }
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Router plus handles on the fakes behind it.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    pub scheduler: Arc<FakeScheduler>,
    pub store: Arc<FakeStore>,
    pub mailer: Arc<FakeMailer>,
}

impl TestApp {
    /// A fresh handle on the router (each request consumes one).
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router, with the production middleware
/// stack, over in-memory cloud and mail fakes.
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with_config(pool, test_config())
}

pub fn build_test_app_with_config(pool: PgPool, config: ServerConfig) -> TestApp {
    let scheduler = Arc::new(FakeScheduler::default());
    let store = Arc::new(FakeStore::default());
    let mailer = Arc::new(FakeMailer::default());

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        scheduler: scheduler.clone(),
        store: store.clone(),
        mailer: mailer.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        pool,
        scheduler,
        store,
        mailer,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty(), None).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty(), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(
        app,
        Method::POST,
        uri,
        Body::from(body.to_string()),
        Some("application/json"),
    )
    .await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Body,
    content_type: Option<&str>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// The submission used throughout: 45 days requested, UAM as basal.
pub fn submission_body() -> serde_json::Value {
    serde_json::json!({
        "target_url": "https://x.example",
        "profile": { "dia": 3 },
        "units": "mg/dL",
        "timezone": "Europe/London",
        "uam_as_basal": true,
        "pump_basal_increment": 0.05,
        "days": 45,
        "email": "someone@example.com",
    })
}

/// A recommendations log in the layout the tuning tool writes.
pub const RECOMMENDATIONS_LOG: &str = "\
Parameter      | Pump     | Autotune | Days Missing
---------------------------------------------------------
ISF [mg/dL/U]  | 86.200   | 80.112   |
CSF [mg/dL/g]  | n/a      | 7.661    |
Carb Ratio[g/U]| 11.000   | 10.452   |
Basals [U/hr]  | -        |
  00:00        | 0.500    | 0.630    | 0
  00:30        | 0.500    | 0.610    | 2
";
