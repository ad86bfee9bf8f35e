//! Error types for interception operations

use intercept_common::{CommandResult, FailureKind, RecoveryAction, RequestId, TabId};
use thiserror::Error;

/// Why attaching a debugging session to a tab failed.
///
/// Each cause calls for a different action from the caller, see
/// [`AttachError::recovery`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("permission denied while attaching to tab: {0}")]
    PermissionDenied(String),

    #[error("another debugger is already attached to this tab")]
    AlreadyAttached,

    #[error("target tab is already closed")]
    TargetClosed,

    #[error("attach failed: {0}")]
    Protocol(String),
}

impl AttachError {
    /// Translate a host error message into a specific cause
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();

        if lower.contains("another debugger") || lower.contains("already attached") {
            AttachError::AlreadyAttached
        } else if lower.contains("no tab with")
            || lower.contains("no target with")
            || lower.contains("target closed")
            || lower.contains("target not found")
            || lower.contains("tab was closed")
        {
            AttachError::TargetClosed
        } else if lower.contains("cannot access")
            || lower.contains("permission")
            || lower.contains("not allowed")
            || lower.contains("denied")
        {
            AttachError::PermissionDenied(message.to_string())
        } else {
            AttachError::Protocol(message.to_string())
        }
    }

    pub fn recovery(&self) -> RecoveryAction {
        match self {
            AttachError::AlreadyAttached => RecoveryAction::CloseOtherDebugger,
            AttachError::Protocol(_) => RecoveryAction::Retry,
            AttachError::PermissionDenied(_) | AttachError::TargetClosed => RecoveryAction::GiveUp,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AttachError::PermissionDenied(_) => FailureKind::PermissionDenied,
            AttachError::AlreadyAttached => FailureKind::DebuggerConflict,
            AttachError::TargetClosed => FailureKind::TargetClosed,
            AttachError::Protocol(_) => FailureKind::Host,
        }
    }
}

/// Failure of a host call other than attach
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("target tab is closed")]
    TargetClosed,

    #[error("no debugging session attached to tab {0}")]
    NotAttached(TabId),

    #[error("host protocol error: {0}")]
    Protocol(String),
}

/// Rejected input, reported synchronously with a reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("too many URL patterns: {count} (max {max})")]
    TooManyPatterns { count: usize, max: usize },

    #[error("URL pattern too long: {length} characters (max {max})")]
    PatternTooLong { length: usize, max: usize },

    #[error("URL pattern contains a disallowed scheme or script: {0}")]
    UnsafePattern(String),

    #[error("invalid status code: {0} (expected an integer between 100 and 599)")]
    InvalidStatus(String),

    #[error("response body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("invalid headers: {0}")]
    InvalidHeaders(String),

    #[error("binary body is not valid base64: {0}")]
    InvalidBinaryBody(String),
}

/// Failure at the editor surface boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    /// The controller is gone; the edit is kept and may be resent
    #[error("interception controller is unreachable")]
    ControllerUnreachable,

    #[error("edit rejected: {0}")]
    Rejected(String),

    #[error("editor could not be opened: {0}")]
    Launch(String),

    #[error("editor is closed")]
    Closed,
}

/// Body transform failure
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// Main error type for the interception core
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("interception is already enabled for tab {0}")]
    AlreadyEnabled(TabId),

    #[error("interception is not enabled for tab {0}")]
    NotEnabled(TabId),

    #[error("too many tabs with interception enabled (max {max})")]
    TooManySessions { max: usize },

    #[error("interception limit reached for tab {tab_id} (max {max})")]
    InterceptionLimit { tab_id: TabId, max: u32 },

    #[error("request {request_id} on tab {tab_id} is already paused")]
    DuplicateInterception { tab_id: TabId, request_id: RequestId },

    #[error("no paused response for request {request_id} on tab {tab_id}")]
    NotFound { tab_id: TabId, request_id: RequestId },

    #[error("tab {0} was closed")]
    TabClosed(TabId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("debugger attach failed: {0}")]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error("interception controller is no longer running")]
    ControllerUnavailable,
}

impl InterceptError {
    pub fn kind(&self) -> FailureKind {
        match self {
            InterceptError::AlreadyEnabled(_) => FailureKind::AlreadyEnabled,
            InterceptError::NotEnabled(_) => FailureKind::NotEnabled,
            InterceptError::TooManySessions { .. } | InterceptError::InterceptionLimit { .. } => {
                FailureKind::Capacity
            }
            InterceptError::DuplicateInterception { .. } | InterceptError::NotFound { .. } => {
                FailureKind::NotFound
            }
            InterceptError::TabClosed(_) | InterceptError::Host(HostError::TargetClosed) => {
                FailureKind::TargetClosed
            }
            InterceptError::Validation(_) => FailureKind::Validation,
            InterceptError::Attach(err) => err.kind(),
            InterceptError::Editor(EditorError::ControllerUnreachable) => FailureKind::Unavailable,
            InterceptError::Host(_) | InterceptError::Codec(_) | InterceptError::Editor(_) => {
                FailureKind::Host
            }
            InterceptError::ControllerUnavailable => FailureKind::Unavailable,
        }
    }

    pub fn recovery(&self) -> Option<RecoveryAction> {
        match self {
            InterceptError::Attach(err) => Some(err.recovery()),
            _ => None,
        }
    }

    /// Structured form returned across a message boundary
    pub fn to_result(&self) -> CommandResult {
        CommandResult::failure(self.kind(), self.to_string()).with_recovery(self.recovery())
    }
}

/// Result type alias for interception operations
pub type InterceptResult<T> = Result<T, InterceptError>;
