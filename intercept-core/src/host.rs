//! Seams between the controller and the outside world
//!
//! The controller never talks to a browser directly. A [`DebuggerHost`] owns
//! the debugging sessions and an [`EditorLauncher`] opens editor surfaces;
//! both report failures as values.

use crate::error::{AttachError, EditorError, HostError};
use async_trait::async_trait;
use intercept_common::{EditorMessage, HeaderEntry, RequestId, TabId};
use serde_json::Value;

/// Body as returned by the host, before decoding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseBody {
    pub body: String,
    pub is_base64: bool,
}

/// Replacement response handed to the host's fulfill primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    pub status: u16,
    pub headers: Vec<HeaderEntry>,
    pub body_base64: String,
}

/// Remote-debugging operations the controller relies on
#[async_trait]
pub trait DebuggerHost: Send + Sync {
    /// Attach a debugging session; attaching twice is a no-op
    async fn attach(&self, tab_id: TabId) -> Result<(), AttachError>;

    /// Detach; detaching an unattached tab is a no-op
    async fn detach(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn enable_response_interception(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn disable_interception(&self, tab_id: TabId) -> Result<(), HostError>;

    async fn get_response_body(&self, tab_id: TabId, request_id: &str) -> Result<ResponseBody, HostError>;

    /// Resume the paused response unmodified
    async fn continue_request(&self, tab_id: TabId, request_id: &str) -> Result<(), HostError>;

    async fn fulfill_request(
        &self,
        tab_id: TabId,
        request_id: &str,
        fulfillment: Fulfillment,
    ) -> Result<(), HostError>;

    /// Liveness probe run before host calls that need the tab
    async fn is_tab_alive(&self, tab_id: TabId) -> bool;
}

/// Opens and closes editor surfaces, one per paused response
#[async_trait]
pub trait EditorLauncher: Send + Sync {
    async fn open(&self, message: EditorMessage) -> Result<(), EditorError>;

    /// Close a surface that is no longer needed; unknown ids are ignored
    async fn close(&self, tab_id: TabId, request_id: &str);
}

/// A response paused by the host, normalized once at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPausedEvent {
    pub tab_id: TabId,
    pub request_id: RequestId,
    pub url: String,
    pub method: String,
    pub resource_type: Option<String>,
    /// Absent when the pause happened at request stage
    pub response_status: Option<u16>,
    pub response_headers: Vec<HeaderEntry>,
    pub response_error_reason: Option<String>,
}

impl RequestPausedEvent {
    pub fn new(tab_id: TabId, request_id: impl Into<RequestId>, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            request_id: request_id.into(),
            url: url.into(),
            method: "GET".to_string(),
            resource_type: None,
            response_status: Some(200),
            response_headers: Vec::new(),
            response_error_reason: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.response_status = status;
        self
    }

    pub fn with_headers(mut self, headers: Vec<HeaderEntry>) -> Self {
        self.response_headers = headers;
        self
    }

    pub fn with_error_reason(mut self, reason: impl Into<String>) -> Self {
        self.response_error_reason = Some(reason.into());
        self
    }

    /// Paused after the response arrived, with a body that can be fetched
    pub fn has_response(&self) -> bool {
        self.response_status.is_some() && self.response_error_reason.is_none()
    }
}

/// Events pushed from the host into the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    RequestPaused(RequestPausedEvent),
    DebuggerDetached { tab_id: TabId, reason: String },
    TabClosed { tab_id: TabId },
}

impl HostEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            HostEvent::RequestPaused(event) => event.tab_id,
            HostEvent::DebuggerDetached { tab_id, .. } | HostEvent::TabClosed { tab_id } => *tab_id,
        }
    }
}

/// Convert any header shape a host may deliver into an ordered list.
///
/// Accepts `[{name, value}]` and `{name: value}`; non-string values are
/// stringified, anything else yields an empty list.
pub fn headers_from_value(value: &Value) -> Vec<HeaderEntry> {
    match value {
        Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let value = entry.get("value").map(stringify).unwrap_or_default();
                Some(HeaderEntry::new(name, value))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .flat_map(|(name, value)| split_folded(name, value))
            .collect(),
        _ => Vec::new(),
    }
}

/// Object-shaped headers fold repeats into one newline-separated value
fn split_folded(name: &str, value: &Value) -> Vec<HeaderEntry> {
    stringify(value)
        .split('\n')
        .map(|part| HeaderEntry::new(name, part))
        .collect()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
