use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use podqueue_core::ValidationErrors;
use podqueue_queue::PublishError;

use super::dto::ValidationErrorResponse;

pub fn publish_error_to_response(err: PublishError) -> Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "publish_error", err.to_string())
}

pub fn validation_error_response(errors: ValidationErrors) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ValidationErrorResponse { errors }),
    )
        .into_response()
}

/// Body that is not a JSON object at all (bad syntax, wrong content type).
pub fn body_rejection_to_response(rejection: JsonRejection) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
