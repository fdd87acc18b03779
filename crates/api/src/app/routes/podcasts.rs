use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use podqueue_core::{TaskPayload, ValidationErrors};
use podqueue_infra::{Ack, QueueClient};
use podqueue_queue::{PublishError, QueueBroker};

use crate::app::AppServices;
use crate::app::dto::{AcceptedResponse, SubmitPodcastRequest};
use crate::app::errors::{
    body_rejection_to_response, publish_error_to_response, validation_error_response,
};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        match self {
            SubmitError::Validation(errors) => validation_error_response(errors),
            SubmitError::Publish(err) => publish_error_to_response(err),
        }
    }
}

/// A submission the broker has taken.
#[derive(Debug)]
pub struct Accepted {
    pub ack: Ack,
    pub payload: TaskPayload,
}

/// Validate a submission and publish it once. Nothing is published when validation fails.
pub async fn submit<B: QueueBroker>(
    queue: &QueueClient<B>,
    request: SubmitPodcastRequest,
) -> Result<Accepted, SubmitError> {
    let payload = request.into_payload()?;
    let ack = queue.submit(payload.clone()).await?;
    Ok(Accepted { ack, payload })
}

pub async fn submit_podcast(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<SubmitPodcastRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejection_to_response(rejection),
    };

    match submit(&services.queue, request).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(AcceptedResponse::for_payload(&accepted.payload)),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use podqueue_infra::QueueConfig;
    use podqueue_queue::InMemoryBroker;

    use crate::app::build_app;

    async fn post(services: AppServices, body: &str) -> (StatusCode, Value) {
        let app = build_app(Arc::new(services));
        let response = app
            .oneshot(
                Request::post("/api/podcasts")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn submit_returns_ack_and_payload() {
        let broker = Arc::new(InMemoryBroker::with_publish_log());
        let queue = QueueClient::new(broker.clone(), QueueConfig::default());

        let accepted = submit(&queue, SubmitPodcastRequest::new(" T ", "https://example.com/a.mp3"))
            .await
            .unwrap();

        assert_eq!(accepted.payload.title(), "T");
        assert_eq!(broker.published()[0].task_id(), accepted.ack.task_id);
    }

    #[tokio::test]
    async fn accepted_submission_is_echoed() {
        let (services, broker) = AppServices::in_memory();
        let (status, body) = post(
            services,
            r#"{"title":"Episode 1","url":"https://example.com/e1.mp3"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Podcast received and queued for processing.");
        assert_eq!(
            body["data"],
            json!({"title": "Episode 1", "url": "https://example.com/e1.mp3"})
        );
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn invalid_submission_lists_every_field_and_publishes_nothing() {
        let (services, broker) = AppServices::in_memory();
        let (status, body) = post(services, r#"{"url":"not a url"}"#).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"]["title"], json!(["The title field is required."]));
        assert_eq!(body["errors"]["url"], json!(["The url field must be a valid URL."]));
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn broker_outage_is_service_unavailable() {
        let (services, broker) = AppServices::in_memory();
        broker.set_available(false);

        let (status, body) =
            post(services, r#"{"title":"T","url":"https://example.com/a.mp3"}"#).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "publish_error");
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let (services, broker) = AppServices::in_memory();
        let (status, body) = post(services, "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_body");
        assert!(broker.published().is_empty());
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        /// Property: every valid submission is published exactly once, with an equal payload.
        #[test]
        fn valid_submissions_publish_one_equal_payload(
            title in "[A-Za-z0-9][A-Za-z0-9 ]{0,120}[A-Za-z0-9]",
            host in "[a-z]{1,20}\\.(com|org|fm)",
            path in "[a-z0-9/]{0,30}",
        ) {
            let url = format!("https://{host}/{path}");
            let broker = Arc::new(InMemoryBroker::with_publish_log());
            let queue = QueueClient::new(broker.clone(), QueueConfig::default());

            let accepted = block_on(submit(&queue, SubmitPodcastRequest::new(&title, &url)))
                .unwrap();

            let published = broker.published();
            prop_assert_eq!(published.len(), 1);
            prop_assert_eq!(published[0].task_id(), accepted.ack.task_id);
            prop_assert_eq!(published[0].payload(), &accepted.payload);
            prop_assert_eq!(published[0].payload().title(), title.as_str());
            prop_assert_eq!(published[0].payload().url(), url.as_str());
        }
    }
}
