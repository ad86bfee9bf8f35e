//! Message contracts between the interception core and its surfaces
//!
//! Each boundary exchanges one tagged union, serialized with a `type`
//! discriminator so JSON senders stay compatible:
//! - `ControlRequest`: inspector UI and editor surface -> core
//! - `EditorMessage`: core -> editor surface
//!
//! Replies are `ControlResponse` values; failures are never thrown across the
//! boundary, they come back as `CommandResult { success: false, .. }`.

use crate::body::{BodyKind, ContentEncoding};
use crate::headers::HeaderEntry;
use crate::{RequestId, TabId};
use serde::{Deserialize, Serialize};

/// Requests accepted by the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    #[serde(rename_all = "camelCase")]
    EnableInterception {
        tab_id: TabId,
        url_patterns: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    DisableInterception { tab_id: TabId },

    #[serde(rename_all = "camelCase")]
    UpdatePatterns {
        tab_id: TabId,
        url_patterns: Vec<String>,
    },

    /// Canned responses fulfilled without opening an editor
    #[serde(rename_all = "camelCase")]
    UpdatePresetResponses {
        tab_id: TabId,
        preset_responses: Vec<PresetResponse>,
    },

    #[serde(rename_all = "camelCase")]
    GetStatus { tab_id: TabId },

    /// Edited response submitted by an editor surface
    #[serde(rename_all = "camelCase")]
    SubmitEdit {
        tab_id: TabId,
        request_id: RequestId,
        #[serde(default)]
        status: Option<serde_json::Value>,
        #[serde(default)]
        headers: Option<serde_json::Value>,
        #[serde(default)]
        body: Option<String>,
    },
}

impl ControlRequest {
    /// Tab the request is addressed to
    pub fn tab_id(&self) -> TabId {
        match self {
            ControlRequest::EnableInterception { tab_id, .. }
            | ControlRequest::DisableInterception { tab_id }
            | ControlRequest::UpdatePatterns { tab_id, .. }
            | ControlRequest::UpdatePresetResponses { tab_id, .. }
            | ControlRequest::GetStatus { tab_id }
            | ControlRequest::SubmitEdit { tab_id, .. } => *tab_id,
        }
    }
}

/// Unvalidated edit as received from an editor surface.
///
/// Fields stay loosely typed until validation so that malformed input is
/// reported as a validation failure instead of a deserialization error.
/// Absent fields keep the original response's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitEditPayload {
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub body: Option<String>,
}

impl SubmitEditPayload {
    pub fn new(status: u16, headers: Vec<HeaderEntry>, body: impl Into<String>) -> Self {
        Self {
            status: Some(serde_json::Value::from(status)),
            headers: serde_json::to_value(headers).ok(),
            body: Some(body.into()),
        }
    }

    pub fn into_request(self, tab_id: TabId, request_id: RequestId) -> ControlRequest {
        ControlRequest::SubmitEdit {
            tab_id,
            request_id,
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Canned replacement for responses matching `url_pattern`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetResponse {
    pub id: String,
    pub url_pattern: String,
    #[serde(default = "default_preset_status")]
    pub status_code: u16,
    #[serde(default)]
    pub response_body: String,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_preset_status() -> u16 {
    200
}

fn default_true() -> bool {
    true
}

/// Lifecycle phase of one tab's interception session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Attaching,
    Intercepting,
    /// At least one response is held for a human decision
    Paused,
    Fulfilling,
    Detaching,
}

/// Snapshot reported for `GET_STATUS`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptionStatus {
    pub enabled: bool,
    pub attached_debugger: bool,
    pub intercepted_count: u32,
    pub pending_count: u32,
    #[serde(default)]
    pub state: SessionState,
}

/// Category of a failed command, so callers can choose a recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AlreadyEnabled,
    NotEnabled,
    Validation,
    Capacity,
    PermissionDenied,
    DebuggerConflict,
    TargetClosed,
    NotFound,
    Host,
    Unavailable,
}

/// What the caller should do after an attach failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    CloseOtherDebugger,
    GiveUp,
}

/// Structured outcome of a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_recovery(mut self, recovery: Option<RecoveryAction>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Reply to a `ControlRequest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Status(InterceptionStatus),
    Result(CommandResult),
}

impl ControlResponse {
    /// Whether the request was carried out
    pub fn is_success(&self) -> bool {
        match self {
            ControlResponse::Status(_) => true,
            ControlResponse::Result(result) => result.success,
        }
    }
}

impl From<CommandResult> for ControlResponse {
    fn from(result: CommandResult) -> Self {
        ControlResponse::Result(result)
    }
}

impl From<InterceptionStatus> for ControlResponse {
    fn from(status: InterceptionStatus) -> Self {
        ControlResponse::Status(status)
    }
}

/// Messages sent from the core to an editor surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditorMessage {
    LoadData(EditorSnapshot),
}

/// Read-only view of one paused response handed to its editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot {
    pub request_id: RequestId,
    pub tab_id: TabId,
    pub url: String,
    pub method: String,
    pub status: u16,
    pub headers: Vec<HeaderEntry>,
    pub body_text: String,
    #[serde(default)]
    pub body_kind: BodyKind,
    #[serde(default)]
    pub content_encoding: ContentEncoding,
    /// Body was compressed on the wire and could not be decompressed
    #[serde(default)]
    pub compressed_unreadable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}
