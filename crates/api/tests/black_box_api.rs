use std::sync::Arc;
use std::time::Duration;

use podqueue_api::app::{AppServices, build_app};
use podqueue_infra::QueueConfig;
use podqueue_infra::jobs::{
    ExecutorConfig, FailFirst, SimulatedPipeline, StageDurations, TaskExecutor, TracingObserver,
};
use podqueue_infra::workers::{WorkerPool, WorkerPoolConfig};
use podqueue_queue::InMemoryBroker;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    broker: Arc<InMemoryBroker>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let broker = Arc::new(InMemoryBroker::with_publish_log());
        let services = AppServices::new(broker.clone(), QueueConfig::default());
        let app = build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            broker,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let server = TestServer::spawn().await;

    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn valid_submission_is_accepted_and_published_once() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/api/podcasts"))
        .json(&json!({"title": "Episode 1", "url": "https://example.com/e1.mp3"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "message": "Podcast received and queued for processing.",
            "data": {"title": "Episode 1", "url": "https://example.com/e1.mp3"}
        })
    );

    let published = server.broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].destination(), "podcasts");
    assert_eq!(published[0].payload().title(), "Episode 1");
}

#[tokio::test]
async fn invalid_submission_is_rejected_without_publishing() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/api/podcasts"))
        .json(&json!({"title": "x".repeat(256), "url": "definitely not a url"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        body["errors"]["title"],
        json!(["The title field must not be greater than 255 characters."])
    );
    assert_eq!(body["errors"]["url"], json!(["The url field must be a valid URL."]));
    assert!(server.broker.published().is_empty());
}

#[tokio::test]
async fn broker_outage_surfaces_as_503() {
    let server = TestServer::spawn().await;
    server.broker.set_available(false);

    let res = reqwest::Client::new()
        .post(server.url("/api/podcasts"))
        .json(&json!({"title": "T", "url": "https://example.com/a.mp3"}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "publish_error");
    assert!(server.broker.published().is_empty());
}

#[tokio::test]
async fn accepted_task_is_processed_by_worker_pool() {
    let server = TestServer::spawn().await;

    // Fails once, then succeeds on the retry.
    let executor = Arc::new(TaskExecutor::new(
        Arc::new(SimulatedPipeline::new(
            StageDurations::zero(),
            Arc::new(FailFirst(1)),
        )),
        Arc::new(TracingObserver),
        ExecutorConfig::default(),
    ));
    let pool = WorkerPool::spawn(
        server.broker.clone(),
        executor,
        WorkerPoolConfig {
            workers: 1,
            receive_wait: Duration::from_millis(20),
            ..Default::default()
        },
    );

    let res = reqwest::Client::new()
        .post(server.url("/api/podcasts"))
        .json(&json!({"title": "T", "url": "https://example.com/a.mp3"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    for _ in 0..200 {
        if pool.stats().tasks_processed >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stats = pool.stats();
    assert_eq!(stats.tasks_succeeded, 1);
    assert_eq!(stats.attempts_failed, 1);
    pool.shutdown().await;

    assert_eq!(server.broker.unacked_len("podcasts", "podcasts.workers"), 0);
}
