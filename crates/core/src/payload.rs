//! The podcast submission record handed from the API to the workers.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationErrors;

/// Maximum title length, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// One podcast submission: a title and the URL of the audio.
///
/// Fields are private: the only ways in are [`TaskPayload::new`],
/// [`TaskPayload::validate`] and deserialization, all of which run the same
/// checks. Surrounding whitespace is trimmed before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTaskPayload")]
pub struct TaskPayload {
    title: String,
    url: String,
}

#[derive(Deserialize)]
struct RawTaskPayload {
    title: Option<String>,
    url: Option<String>,
}

impl TryFrom<RawTaskPayload> for TaskPayload {
    type Error = ValidationErrors;

    fn try_from(raw: RawTaskPayload) -> Result<Self, Self::Error> {
        Self::validate(raw.title.as_deref(), raw.url.as_deref())
    }
}

impl TaskPayload {
    pub fn new(title: impl AsRef<str>, url: impl AsRef<str>) -> Result<Self, ValidationErrors> {
        Self::validate(Some(title.as_ref()), Some(url.as_ref()))
    }

    /// Validate both fields and report every failure, not just the first.
    pub fn validate(title: Option<&str>, url: Option<&str>) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_title(title, &mut errors);
        check_url(url, &mut errors);
        errors.into_result()?;

        Ok(Self {
            title: normalize(title),
            url: normalize(url),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn normalize(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// `title`: required, at most [`MAX_TITLE_LEN`] characters.
pub fn check_title(title: Option<&str>, errors: &mut ValidationErrors) {
    match title.map(str::trim) {
        None | Some("") => errors.add("title", "The title field is required."),
        Some(t) if t.chars().count() > MAX_TITLE_LEN => errors.add(
            "title",
            format!("The title field must not be greater than {MAX_TITLE_LEN} characters."),
        ),
        Some(_) => {}
    }
}

/// `url`: required, absolute `http`/`https`, with a host.
pub fn check_url(url: Option<&str>, errors: &mut ValidationErrors) {
    match url.map(str::trim) {
        None | Some("") => errors.add("url", "The url field is required."),
        Some(u) => match Url::parse(u) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {}
            _ => errors.add("url", "The url field must be a valid URL."),
        },
    }
}
