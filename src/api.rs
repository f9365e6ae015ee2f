use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, multipart};
use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request failed with status code {status}")]
    Status { status: u16, body: Value },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("failed to read {path}: {message}")]
    File { path: String, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The message the backend attached to a failed response: the raw body
    /// when it is a string, otherwise its `message` field.
    pub fn backend_message(&self) -> Option<String> {
        let ApiError::Status { body, .. } = self else {
            return None;
        };
        match body {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            _ => None,
        }
    }

    /// Display string for a failed user action. Transport failures keep their
    /// own description; a bare HTTP status falls back to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(message) = self.backend_message() {
            return message;
        }
        match self {
            ApiError::Status { .. } => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Text parts plus at most one file part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Multipart {
    pub text: Vec<(String, String)>,
    pub file: Option<(String, PathBuf)>,
}

impl Multipart {
    pub fn file(part: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            text: Vec::new(),
            file: Some((part.to_string(), path.into())),
        }
    }
}

/// The REST backend. Paths are relative to the configured API base URL.
pub trait Backend {
    fn get(&self, path: &str) -> Result<Value, ApiError>;
    fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError>;
    fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError>;
    fn delete(&self, path: &str) -> Result<Value, ApiError>;
    fn multipart(&self, method: Method, path: &str, form: Multipart) -> Result<Value, ApiError>;
    /// Raw bytes of a file, by absolute URL or API-relative path.
    fn download(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    fn write(&self, method: Method, path: &str, body: &Value) -> Result<Value, ApiError> {
        match method {
            Method::Post => self.post(path, body),
            Method::Put => self.put(path, body),
        }
    }
}

/// Successful bodies are JSON when they parse, otherwise the raw text
/// (upload endpoints answer with a bare filename).
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Unwraps the `{ "data": ... }` envelope most list endpoints use.
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

pub struct HttpBackend {
    base_url: String,
    client: Client,
    jar: Arc<Jar>,
}

impl HttpBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            client,
            jar,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn cookie_url(&self) -> Option<Url> {
        Url::parse(&self.base_url).ok()
    }

    /// The `Cookie` header the jar would send, for persisting between runs.
    pub fn session_cookie(&self) -> Option<String> {
        let url = self.cookie_url()?;
        self.jar
            .cookies(&url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
    }

    pub fn restore_cookie(&self, header: &str) {
        let Some(url) = self.cookie_url() else { return };
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.jar.add_cookie_str(pair, &url);
        }
    }

    fn send(&self, method: &str, path: &str, request: RequestBuilder) -> Result<Value, ApiError> {
        debug!(method, path, "backend request");
        let response = request
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body = parse_body(&text);
        if !status.is_success() {
            warn!(method, path, status = status.as_u16(), "backend request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl Backend for HttpBackend {
    fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send("GET", path, self.client.get(self.url(path)))
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send("POST", path, self.client.post(self.url(path)).json(body))
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.send("PUT", path, self.client.put(self.url(path)).json(body))
    }

    fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send("DELETE", path, self.client.delete(self.url(path)))
    }

    fn multipart(&self, method: Method, path: &str, form: Multipart) -> Result<Value, ApiError> {
        let mut parts = multipart::Form::new();
        for (name, value) in form.text {
            parts = parts.text(name, value);
        }
        if let Some((name, file)) = form.file {
            parts = parts.file(name, &file).map_err(|e| ApiError::File {
                path: file.display().to_string(),
                message: e.to_string(),
            })?;
        }
        let request = match method {
            Method::Post => self.client.post(self.url(path)),
            Method::Put => self.client.put(self.url(path)),
        };
        self.send(method.as_str(), path, request.multipart(parts))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        debug!(url, "download");
        let response = self
            .client
            .get(self.url(url))
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: Value::Null,
            });
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_handles_text_and_json() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("cv_123.pdf"), json!("cv_123.pdf"));
    }

    #[test]
    fn test_unwrap_data() {
        assert_eq!(unwrap_data(json!({"data": [1, 2]})), json!([1, 2]));
        assert_eq!(unwrap_data(json!([1, 2])), json!([1, 2]));
        assert_eq!(unwrap_data(json!({"total": 2})), json!({"total": 2}));
    }

    #[test]
    fn test_user_message_prefers_backend_text() {
        let err = ApiError::Status { status: 500, body: json!("Job has applications") };
        assert_eq!(err.user_message("Delete failed"), "Job has applications");

        let err = ApiError::Status { status: 400, body: json!({"message": "Email exists"}) };
        assert_eq!(err.user_message("Operation failed"), "Email exists");

        let err = ApiError::Status { status: 500, body: json!({"error": "boom"}) };
        assert_eq!(err.user_message("Delete failed"), "Delete failed");

        let err = ApiError::Transport("connection refused".to_string());
        assert_eq!(err.user_message("Delete failed"), "request failed: connection refused");
    }

    #[test]
    fn test_http_backend_joins_paths() {
        let settings = Settings::default();
        let backend = HttpBackend::new(&settings).unwrap();
        assert_eq!(backend.url("/job"), "http://localhost:8800/api/job");
        assert_eq!(backend.url("https://cdn.example.com/cv.pdf"), "https://cdn.example.com/cv.pdf");
    }

    #[test]
    fn test_cookie_roundtrip_through_jar() {
        let backend = HttpBackend::new(&Settings::default()).unwrap();
        assert_eq!(backend.session_cookie(), None);
        backend.restore_cookie("accessToken=abc123");
        assert_eq!(backend.session_cookie().as_deref(), Some("accessToken=abc123"));
    }
}
