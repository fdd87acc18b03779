use serde::{Deserialize, Serialize};
use serde_json::Value;

use podqueue_core::{TaskPayload, ValidationErrors, check_title, check_url};

/// Message returned with every accepted submission.
pub const ACCEPTED_MESSAGE: &str = "Podcast received and queued for processing.";

// -------------------------
// Request DTOs
// -------------------------

/// Raw submission body.
///
/// Fields are kept as loose JSON so that a wrong type is reported per field
/// alongside the other validation errors, instead of failing deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitPodcastRequest {
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub url: Option<Value>,
}

impl SubmitPodcastRequest {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: Some(Value::String(title.into())),
            url: Some(Value::String(url.into())),
        }
    }

    /// Validate every field and build the payload, or report all failures.
    pub fn into_payload(self) -> Result<TaskPayload, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = string_field("title", self.title, &mut errors);
        let url = string_field("url", self.url, &mut errors);

        if let Some(title) = &title {
            check_title(title.as_deref(), &mut errors);
        }
        if let Some(url) = &url {
            check_url(url.as_deref(), &mut errors);
        }
        errors.into_result()?;

        TaskPayload::validate(title.flatten().as_deref(), url.flatten().as_deref())
    }
}

/// `Some(None)` for absent/null, `Some(Some(s))` for a string, `None` (error recorded) otherwise.
fn string_field(
    name: &'static str,
    value: Option<Value>,
    errors: &mut ValidationErrors,
) -> Option<Option<String>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s)),
        Some(_) => {
            errors.add(name, format!("The {name} field must be a string."));
            None
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct PodcastData {
    pub title: String,
    pub url: String,
}

impl From<&TaskPayload> for PodcastData {
    fn from(p: &TaskPayload) -> Self {
        Self {
            title: p.title().to_string(),
            url: p.url().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub message: &'static str,
    pub data: PodcastData,
}

impl AcceptedResponse {
    pub fn for_payload(payload: &TaskPayload) -> Self {
        Self {
            message: ACCEPTED_MESSAGE,
            data: payload.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationErrorResponse {
    pub errors: ValidationErrors,
}
