//! Passive request log
//!
//! Keeps recently completed requests for display and replay. The log is
//! bounded by count and age; oversized bodies are truncated on insert.

use crate::config::CaptureConfig;
use chrono::{DateTime, Duration, Utc};
use intercept_common::{HeaderEntry, TabId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Appended to truncated text
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Resource types that are never logged
const SKIPPED_RESOURCE_TYPES: &[&str] = &["document", "main_frame", "sub_frame", "beacon", "ping"];

/// Browser-internal URL schemes that are never logged
const INTERNAL_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "moz-extension://",
    "edge://",
    "devtools://",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub id: String,
    pub tab_id: Option<TabId>,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub request_headers: Vec<HeaderEntry>,
    #[serde(default)]
    pub request_body: Option<String>,
    /// `None` while the request is in flight
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub response_headers: Vec<HeaderEntry>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl CapturedRequest {
    pub fn new(id: impl Into<String>, tab_id: Option<TabId>, url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tab_id,
            url: url.into(),
            method: method.into(),
            resource_type: None,
            request_headers: Vec::new(),
            request_body: None,
            status: None,
            response_headers: Vec::new(),
            response: None,
            error: None,
            from_cache: false,
            started_at: Utc::now(),
            duration_ms: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_some() || self.error.is_some()
    }

    fn finish(&mut self, at: DateTime<Utc>) {
        self.duration_ms = Some((at - self.started_at).num_milliseconds().max(0));
    }
}

#[derive(Debug)]
pub struct RequestLog {
    config: CaptureConfig,
    entries: HashMap<String, CapturedRequest>,
}

impl RequestLog {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Whether a request of this kind is logged at all
    pub fn should_capture(&self, url: &str, resource_type: Option<&str>) -> bool {
        if !self.config.enabled {
            return false;
        }
        if INTERNAL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
            return false;
        }
        match resource_type {
            Some(kind) => !SKIPPED_RESOURCE_TYPES
                .iter()
                .any(|skipped| kind.eq_ignore_ascii_case(skipped)),
            None => true,
        }
    }

    /// Log a new request, making room first when the log is full
    pub fn record_request(&mut self, mut request: CapturedRequest) -> bool {
        if !self.should_capture(&request.url, request.resource_type.as_deref()) {
            return false;
        }

        if self.entries.len() >= self.config.max_requests_in_memory {
            self.cleanup_at(Utc::now());
        }

        if let Some(body) = request.request_body.take() {
            request.request_body = Some(truncate(body, self.config.max_request_body_size));
        }
        if let Some(response) = request.response.take() {
            request.response = Some(truncate(response, self.config.max_response_size));
        }

        self.entries.insert(request.id.clone(), request);
        true
    }

    pub fn record_response(
        &mut self,
        id: &str,
        status: u16,
        headers: Vec<HeaderEntry>,
        from_cache: bool,
    ) -> Option<&CapturedRequest> {
        let entry = self.entries.get_mut(id)?;
        entry.status = Some(status);
        entry.response_headers = headers;
        entry.from_cache = from_cache;
        entry.finish(Utc::now());
        Some(entry)
    }

    pub fn record_body(&mut self, id: &str, text: String) -> bool {
        let limit = self.config.max_response_size;
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.response = Some(truncate(text, limit));
                true
            }
            None => false,
        }
    }

    pub fn record_error(&mut self, id: &str, error: impl Into<String>) -> Option<&CapturedRequest> {
        let entry = self.entries.get_mut(id)?;
        let error = error.into();
        entry.response = Some(format!("request failed: {}", error));
        entry.error = Some(error);
        entry.finish(Utc::now());
        Some(entry)
    }

    pub fn get(&self, id: &str) -> Option<&CapturedRequest> {
        self.entries.get(id)
    }

    /// Logged requests, oldest first, optionally limited to one tab
    pub fn requests(&self, tab_id: Option<TabId>) -> Vec<CapturedRequest> {
        let mut requests: Vec<CapturedRequest> = self
            .entries
            .values()
            .filter(|request| tab_id.is_none() || request.tab_id == tab_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        requests
    }

    pub fn remove(&mut self, id: &str) -> Option<CapturedRequest> {
        self.entries.remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expire old entries, then evict the oldest batch if still full.
    /// Returns how many entries were removed.
    pub fn cleanup_at(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = Duration::seconds(self.config.request_ttl_secs as i64);
        let batch = self.config.batch_cleanup_size.max(1);

        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .values()
            .map(|request| (request.started_at, request.id.clone()))
            .collect();
        by_age.sort();

        let expired: Vec<String> = by_age
            .iter()
            .filter(|(started_at, _)| now - *started_at > ttl)
            .take(batch)
            .map(|(_, id)| id.clone())
            .collect();
        let mut removed = 0;
        for id in &expired {
            if self.entries.remove(id).is_some() {
                removed += 1;
            }
        }

        if self.entries.len() >= self.config.max_requests_in_memory {
            for (_, id) in by_age.iter().filter(|(_, id)| !expired.contains(id)).take(batch) {
                if self.entries.remove(id).is_some() {
                    removed += 1;
                }
            }
        }

        debug!(removed, remaining = self.entries.len(), "request log cleanup");
        removed
    }
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
