//! Common wire types for the response interception workspace
//!
//! This crate defines the shapes that cross a surface boundary:
//! - the control surface used by the inspector UI
//! - the editor surface that edits one paused response
//! - status and result payloads returned to both

pub mod body;
pub mod headers;
pub mod messages;

pub use body::{BodyKind, ContentEncoding};
pub use headers::HeaderEntry;
pub use messages::{
    CommandResult, ControlRequest, ControlResponse, EditorMessage, EditorSnapshot, FailureKind,
    InterceptionStatus, PresetResponse, RecoveryAction, SessionState, SubmitEditPayload,
};

/// Identifier of an inspected browser tab
pub type TabId = i64;

/// Identifier of a paused request, unique only within one debugging session
pub type RequestId = String;
