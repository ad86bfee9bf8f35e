//! Editor surface for one paused response
//!
//! The surface receives a `LOAD_DATA` snapshot, lets a person change status,
//! headers and body, and sends the result back as `SUBMIT_EDIT` through a
//! [`ControllerLink`]. It holds no state beyond the single edit in flight.

use crate::actor::ControllerHandle;
use crate::error::{EditorError, InterceptError};
use async_trait::async_trait;
use intercept_common::{
    BodyKind, CommandResult, ControlRequest, ControlResponse, EditorMessage, EditorSnapshot,
    HeaderEntry, SubmitEditPayload, TabId,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Message path from an editor surface back to the controller
#[async_trait]
pub trait ControllerLink: Send + Sync {
    async fn send(&self, request: ControlRequest) -> Result<ControlResponse, EditorError>;

    /// The surface went away without submitting
    async fn surface_closed(&self, tab_id: TabId, request_id: &str) -> Result<(), EditorError>;
}

#[async_trait]
impl ControllerLink for ControllerHandle {
    async fn send(&self, request: ControlRequest) -> Result<ControlResponse, EditorError> {
        self.request(request).await.map_err(link_error)
    }

    async fn surface_closed(&self, tab_id: TabId, request_id: &str) -> Result<(), EditorError> {
        self.editor_closed(tab_id, request_id).await.map_err(link_error)?;
        Ok(())
    }
}

fn link_error(err: InterceptError) -> EditorError {
    match err {
        InterceptError::ControllerUnavailable => EditorError::ControllerUnreachable,
        other => EditorError::Rejected(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    /// Waiting for `LOAD_DATA`
    Empty,
    Editing,
    Closed,
}

pub struct EditorSurface<L: ControllerLink> {
    link: L,
    snapshot: Option<EditorSnapshot>,
    state: EditorState,
    status: String,
    headers: Vec<HeaderEntry>,
    body: String,
    last_error: Option<String>,
}

impl<L: ControllerLink> EditorSurface<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            snapshot: None,
            state: EditorState::Empty,
            status: String::new(),
            headers: Vec::new(),
            body: String::new(),
            last_error: None,
        }
    }

    /// Present a snapshot; JSON bodies are pretty-printed
    pub fn load(&mut self, message: EditorMessage) {
        let EditorMessage::LoadData(snapshot) = message;
        debug!(tab_id = snapshot.tab_id, request_id = %snapshot.request_id, "editor loaded");

        self.snapshot = Some(snapshot);
        self.state = EditorState::Editing;
        self.reset();
    }

    /// Discard edits and show the snapshot again
    pub fn reset(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            self.status = snapshot.status.to_string();
            self.headers = snapshot.headers.clone();
            self.body = display_body(snapshot);
            self.last_error = None;
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == EditorState::Editing
    }

    pub fn snapshot(&self) -> Option<&EditorSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn headers(&self) -> &[HeaderEntry] {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Replace the first header with this name, or append it
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|header| header.is(name)) {
            Some(header) => header.value = value,
            None => self.headers.push(HeaderEntry::new(name, value)),
        }
    }

    pub fn remove_header(&mut self, name: &str) {
        intercept_common::headers::remove_header(&mut self.headers, name);
    }

    /// Send the edit. The surface closes only on a positive acknowledgement;
    /// otherwise it stays open with the error so the edit can be retried.
    pub async fn submit(&mut self) -> Result<CommandResult, EditorError> {
        let snapshot = match (&self.snapshot, self.state) {
            (Some(snapshot), EditorState::Editing) => snapshot,
            _ => return Err(EditorError::Closed),
        };

        let payload = SubmitEditPayload {
            status: Some(Value::String(self.status.trim().to_string())),
            headers: serde_json::to_value(&self.headers).ok(),
            body: Some(self.body.clone()),
        };
        let request = payload.into_request(snapshot.tab_id, snapshot.request_id.clone());

        let outcome = match self.link.send(request).await {
            Ok(ControlResponse::Result(result)) if result.success => Ok(result),
            Ok(ControlResponse::Result(result)) => Err(EditorError::Rejected(
                result.error.unwrap_or_else(|| "edit was not applied".to_string()),
            )),
            Ok(ControlResponse::Status(_)) => Err(EditorError::Rejected(
                "unexpected status reply to an edit".to_string(),
            )),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(result) => {
                self.state = EditorState::Closed;
                self.last_error = None;
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, "edit not applied, editor stays open");
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Close without submitting; the controller passes the response through
    pub async fn cancel(&mut self) {
        if self.state == EditorState::Closed {
            return;
        }
        self.state = EditorState::Closed;

        if let Some(snapshot) = &self.snapshot {
            if let Err(err) = self
                .link
                .surface_closed(snapshot.tab_id, &snapshot.request_id)
                .await
            {
                debug!(error = %err, "close notification not delivered");
            }
        }
    }
}

/// Body as shown for editing
fn display_body(snapshot: &EditorSnapshot) -> String {
    if snapshot.body_kind == BodyKind::Text {
        if let Some(pretty) = pretty_json(&snapshot.body_text) {
            return pretty;
        }
    }
    snapshot.body_text.clone()
}

/// Pretty-print JSON objects and arrays; anything else is left alone
pub fn pretty_json(text: &str) -> Option<String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => serde_json::to_string_pretty(&value).ok(),
        _ => None,
    }
}
