//! What an HTTP front end renders for one `url` form field.

use serde::Serialize;

use crate::error::{Error, ReasonCode};
use crate::fetch::{fetch, FetchOptions, FetchResult};
use crate::policy::ValidationPolicy;
use crate::validate::validate;

/// Outcome of [`handle`], ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Report {
    Fetched {
        status_code: u16,
        body_excerpt: String,
        truncated: bool,
    },
    Rejected {
        reason_code: ReasonCode,
        message: String,
    },
    Failed {
        error_kind: ReasonCode,
        message: String,
    },
}

impl Report {
    pub fn from_error(e: &Error) -> Self {
        let code = e.code();
        if code.is_rejection() {
            Report::Rejected {
                reason_code: code,
                message: e.to_string(),
            }
        } else {
            Report::Failed {
                error_kind: code,
                message: e.to_string(),
            }
        }
    }

    /// Status code the front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Report::Fetched { .. } => 200,
            Report::Rejected { .. } => 400,
            Report::Failed { error_kind, .. } => match error_kind {
                ReasonCode::Timeout => 504,
                ReasonCode::NetworkError | ReasonCode::BodyTooLarge => 502,
                _ => 400,
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<FetchResult> for Report {
    fn from(result: FetchResult) -> Self {
        Report::Fetched {
            status_code: result.status_code,
            body_excerpt: result.text().into_owned(),
            truncated: result.truncated,
        }
    }
}

impl From<Result<FetchResult, Error>> for Report {
    fn from(outcome: Result<FetchResult, Error>) -> Self {
        match outcome {
            Ok(result) => result.into(),
            Err(e) => Report::from_error(&e),
        }
    }
}

/// Validate then fetch one submitted URL.
///
/// A missing field is treated as a malformed URL.
pub async fn handle(url: Option<&str>, policy: &ValidationPolicy, options: &FetchOptions) -> Report {
    let Some(raw) = url else {
        return Report::from_error(&Error::invalid_url("", "missing url field"));
    };

    let accepted = match validate(raw, policy) {
        Ok(accepted) => accepted,
        Err(e) => return Report::from_error(&e),
    };

    fetch(&accepted.url, policy, options).await.into()
}
