//! Request redaction for error logging.
//!
//! # Invariants
//! - Any JSON object key named `password`, at any depth, is replaced by
//!   `<hidden>` before logging.
//! - `X-User-Token` and `Cookie` header values are replaced by `<hidden>`
//!   (header names compare case-insensitively).
//! - Logged bodies are capped: 120 chars for multipart, 5000 otherwise.

use crate::logging::single_line;
use serde_json::Value;

pub const HIDDEN: &str = "<hidden>";
pub const USER_TOKEN_HEADER: &str = "X-User-Token";
pub const COOKIE_HEADER: &str = "Cookie";
pub const MAX_BODY_CHARS: usize = 5000;
pub const MAX_MULTIPART_BODY_CHARS: usize = 120;

const PASSWORD_KEY: &str = "password";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Request data the error mapper logs alongside a rendered error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub content_type: Option<String>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>, content_type: Option<&str>) -> Self {
        self.body = body.into();
        self.content_type = content_type.map(str::to_string);
        self
    }
}

/// Body with secrets hidden and length capped.
pub fn filtered_body(body: &str, content_type: Option<&str>) -> String {
    let filtered = match serde_json::from_str::<Value>(body) {
        Ok(mut value @ (Value::Object(_) | Value::Array(_))) => {
            if hide_passwords(&mut value) {
                value.to_string()
            } else {
                body.to_string()
            }
        }
        _ => body.to_string(),
    };

    let is_multipart = content_type
        .map(|value| value.trim().to_ascii_lowercase().starts_with(MULTIPART_FORM_DATA))
        .unwrap_or(false);
    if is_multipart {
        truncate(&filtered, MAX_MULTIPART_BODY_CHARS)
    } else {
        truncate(&filtered, MAX_BODY_CHARS)
    }
}

/// Headers with token and cookie values hidden.
pub fn filtered_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let secret = name.eq_ignore_ascii_case(USER_TOKEN_HEADER)
                || name.eq_ignore_ascii_case(COOKIE_HEADER);
            let value = if secret { HIDDEN.to_string() } else { value.clone() };
            (name.clone(), value)
        })
        .collect()
}

/// One log line describing the failed request, already redacted.
pub fn request_log_line(code: u16, request: Option<&RequestContext>) -> String {
    let Some(request) = request else {
        return format!("event=http_error module=rest code={code} method= url= headers={{}} body=");
    };
    let headers = filtered_headers(&request.headers)
        .into_iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");
    let body = filtered_body(&request.body, request.content_type.as_deref());
    format!(
        "event=http_error module=rest code={code} method={} url={} headers={{{headers}}} body={}",
        request.method,
        request.url,
        single_line(&body)
    )
}

/// Hides every `password` value; returns whether anything was hidden.
fn hide_passwords(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut hidden = false;
            for (key, nested) in map.iter_mut() {
                if key == PASSWORD_KEY {
                    *nested = Value::String(HIDDEN.to_string());
                    hidden = true;
                } else {
                    hidden |= hide_passwords(nested);
                }
            }
            hidden
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |hidden, item| hide_passwords(item) | hidden),
        _ => false,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
