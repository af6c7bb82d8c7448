//! JSON error bodies for the HTTP surface.
//!
//! Every failure becomes a [`JsonHttpError`] whose body is either the
//! structured `{"status": "error", "errors": [...]}` shape or, for 410, the
//! gone explanation. Each rendered error is logged together with the
//! redacted request.

use crate::error::{CoreError, ForkNotAllowedError};
use crate::rest::redact::{request_log_line, RequestContext};
use chrono::{DateTime, FixedOffset, Local};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, UnwindSafe};

pub const LOCATION_BODY: &str = "body";
pub const LOCATION_URL: &str = "url";
pub const LOCATION_INTERNAL: &str = "internal";

/// One entry of the `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub location: String,
    pub name: String,
    pub description: String,
}

impl ErrorEntry {
    pub fn new(
        location: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub errors: Vec<ErrorEntry>,
}

impl ErrorBody {
    pub fn new(errors: Vec<ErrorEntry>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }
}

/// Metadata of a removed or hidden resource, as far as it is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoneMetadata {
    pub modification_date: Option<DateTime<FixedOffset>>,
    pub modified_by: Option<String>,
}

/// Body of a 410 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoneExplanation {
    pub modification_date: String,
    pub modified_by: Option<String>,
    pub reason: String,
}

/// Failures the HTTP surface can report.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    /// Schema validation failures collected for one request.
    Validation(Vec<ErrorEntry>),
    /// Plain client error such as 403 or 404.
    Client { code: u16 },
    /// The request URL could not be decoded.
    UrlDecode(String),
    Gone {
        reason: String,
        metadata: Option<GoneMetadata>,
    },
    /// Anything unclassified; `kind` names the failure type.
    Internal { kind: String, message: String },
}

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        Self::Core(value)
    }
}

/// A rendered HTTP error.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonHttpError {
    pub code: u16,
    pub title: &'static str,
    pub body: Value,
}

impl JsonHttpError {
    pub fn status_line(&self) -> String {
        format!("{} {}", self.code, self.title)
    }

    pub fn to_json(&self) -> String {
        self.body.to_string()
    }

    /// Structured error body; `None` for the 410 explanation shape.
    pub fn error_body(&self) -> Option<ErrorBody> {
        serde_json::from_value(self.body.clone()).ok()
    }

    fn from_entries(code: u16, errors: Vec<ErrorEntry>) -> Self {
        let body = serde_json::to_value(ErrorBody::new(errors))
            .unwrap_or_else(|_| json!({"status": "error", "errors": []}));
        Self {
            code,
            title: status_title(code),
            body,
        }
    }
}

pub fn status_title(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        410 => "Gone",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

/// Fork rejection description, kept stable for API clients.
pub fn fork_description(err: &ForkNotAllowedError) -> String {
    format!(
        "No fork allowed - The auto update tried to create a fork for: {} caused by isheet: {} \
         field: {} with old_reference: {} and new reference: {}. Try another root_version.",
        err.resource, err.sheet, err.field, err.old_version, err.new_version
    )
}

/// Renders `err` and logs it with the redacted `request`.
pub fn render(err: &ApiError, request: Option<&RequestContext>) -> JsonHttpError {
    let method = request.map(|request| request.method.as_str()).unwrap_or("");
    let rendered = match err {
        ApiError::Core(core) => render_core(core, method),
        ApiError::Validation(entries) => JsonHttpError::from_entries(400, entries.clone()),
        ApiError::Client { code } => client_error(*code, method),
        ApiError::UrlDecode(detail) => JsonHttpError::from_entries(
            400,
            vec![ErrorEntry::new(
                LOCATION_URL,
                "",
                format!("400 Bad Request {detail}"),
            )],
        ),
        ApiError::Gone { reason, metadata } => gone(reason, metadata.as_ref()),
        ApiError::Internal { kind, message } => internal(kind, message),
    };
    log_rendered(&rendered, request);
    rendered
}

/// Runs a request handler and renders any failure, panics included.
pub fn guard<T, F>(request: Option<&RequestContext>, handler: F) -> Result<T, JsonHttpError>
where
    F: FnOnce() -> Result<T, ApiError> + UnwindSafe,
{
    match catch_unwind(handler) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(render(&err, request)),
        Err(payload) => {
            let message = if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "non-string panic payload".to_string()
            };
            let err = ApiError::Internal {
                kind: "panic".to_string(),
                message,
            };
            Err(render(&err, request))
        }
    }
}

fn render_core(err: &CoreError, method: &str) -> JsonHttpError {
    match err {
        CoreError::ForkNotAllowed(fork) => JsonHttpError::from_entries(
            400,
            vec![ErrorEntry::new(
                LOCATION_BODY,
                "root_versions",
                fork_description(fork),
            )],
        ),
        CoreError::Validation { name, message } => JsonHttpError::from_entries(
            400,
            vec![ErrorEntry::new(LOCATION_BODY, name.as_str(), message.as_str())],
        ),
        CoreError::NotFound { .. } => client_error(404, method),
        CoreError::Path(path) => JsonHttpError::from_entries(
            400,
            vec![ErrorEntry::new(
                LOCATION_URL,
                "",
                format!("400 Bad Request {path}"),
            )],
        ),
        CoreError::Db(_) | CoreError::InvalidData(_) | CoreError::Handler { .. } => {
            internal(err.code(), &err.to_string())
        }
    }
}

fn client_error(code: u16, method: &str) -> JsonHttpError {
    JsonHttpError::from_entries(
        code,
        vec![ErrorEntry::new(
            LOCATION_URL,
            method,
            format!("{code} {}", status_title(code)),
        )],
    )
}

fn gone(reason: &str, metadata: Option<&GoneMetadata>) -> JsonHttpError {
    let explanation = GoneExplanation {
        modification_date: metadata
            .and_then(|meta| meta.modification_date)
            .map(|date| date.to_rfc3339())
            .unwrap_or_default(),
        modified_by: metadata.and_then(|meta| meta.modified_by.clone()),
        reason: reason.to_string(),
    };
    let body = serde_json::to_value(&explanation).unwrap_or_else(|_| json!({"reason": reason}));
    JsonHttpError {
        code: 410,
        title: status_title(410),
        body,
    }
}

/// Error-level log line for a 500, including a captured backtrace.
fn internal_log_line(kind: &str, message: &str) -> String {
    format!(
        "event=internal_error module=rest status=error kind={} message={} backtrace={:?}",
        kind,
        message,
        Backtrace::force_capture()
    )
}

fn internal(kind: &str, message: &str) -> JsonHttpError {
    error!("{}", internal_log_line(kind, message));
    let description = format!(
        "{kind}: {message}; time: {}",
        Local::now().format("%Y-%m-%dT%H:%M:%S%.6f%:z")
    );
    JsonHttpError::from_entries(500, vec![ErrorEntry::new(LOCATION_INTERNAL, "", description)])
}

fn log_rendered(rendered: &JsonHttpError, request: Option<&RequestContext>) {
    warn!("{}", request_log_line(rendered.code, request));
    if let Some(body) = rendered.error_body() {
        for entry in body.errors {
            warn!(
                "event=http_error_entry module=rest location={} name={} description={}",
                entry.location, entry.name, entry.description
            );
        }
    }
}
