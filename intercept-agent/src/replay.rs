//! Resend a logged or hand-edited request

use crate::error::{AgentError, AgentResult};
use intercept_common::headers::header_value;
use intercept_common::HeaderEntry;
use intercept_core::editor::pretty_json;
use intercept_core::CapturedRequest;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// Headers the HTTP client manages itself
const MANAGED_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

/// Request to resend.
///
/// With `capture_id` the logged request is the starting point and any
/// field given here replaces its counterpart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    #[serde(default)]
    pub capture_id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<HeaderEntry>>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ReplayRequest {
    /// Fill unset fields from a logged request
    pub fn based_on(mut self, captured: &CapturedRequest) -> Self {
        self.method.get_or_insert_with(|| captured.method.clone());
        self.url.get_or_insert_with(|| captured.url.clone());
        self.headers.get_or_insert_with(|| captured.request_headers.clone());
        if self.body.is_none() {
            self.body = captured.request_body.clone();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<HeaderEntry>,
    /// JSON bodies are pretty-printed
    pub body: String,
    pub duration_ms: u64,
}

pub struct Replayer {
    client: reqwest::Client,
}

impl Replayer {
    pub fn new(timeout: Duration) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Replay(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub async fn send(&self, request: ReplayRequest) -> AgentResult<ReplayResponse> {
        let method_name = request.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| AgentError::Replay(format!("Invalid method: {}", method_name)))?;
        let url = parse_url(request.url.as_deref().unwrap_or_default())?;

        let mut builder = self.client.request(method.clone(), url.clone());
        for header in request.headers.iter().flatten() {
            if MANAGED_HEADERS.iter().any(|managed| header.is(managed)) {
                continue;
            }
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = request.body {
            if method != Method::GET && method != Method::HEAD {
                builder = builder.body(body);
            }
        }

        debug!(method = %method, url = %url, "replaying request");
        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| AgentError::Replay(format!("Request failed: {}", e)))?;

        let status = response.status();
        let headers: Vec<HeaderEntry> = response
            .headers()
            .iter()
            .map(|(name, value)| HeaderEntry::new(name.as_str(), String::from_utf8_lossy(value.as_bytes())))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| AgentError::Replay(format!("Failed to read response body: {}", e)))?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let is_json = header_value(&headers, "content-type")
            .map(|value| value.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        let body = match is_json {
            true => pretty_json(&text).unwrap_or(text),
            false => text,
        };

        info!(url = %url, status = status.as_u16(), duration_ms, "replay finished");
        Ok(ReplayResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            duration_ms,
        })
    }
}

fn parse_url(raw: &str) -> AgentResult<Url> {
    let url = Url::parse(raw).map_err(|e| AgentError::Replay(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AgentError::Replay(format!("Unsupported URL scheme: {}", scheme))),
    }
}
