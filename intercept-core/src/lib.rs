//! Response Interception Core
//!
//! This library holds the interception pipeline for inspected browser tabs:
//! deciding which paused responses to hold, presenting their bodies for
//! editing, and resolving each one exactly once by fulfilling or resuming it.
//! It performs no I/O itself; browsers and editor surfaces are reached
//! through the traits in [`host`].

pub mod actor;
pub mod capture;
pub mod codec;
pub mod controller;
pub mod correlation;
pub mod editor;
pub mod filter;
pub mod host;
pub mod session;
pub mod validation;

/// Configuration types and utilities
pub mod config;

/// Error types for interception operations
pub mod error;

pub use actor::{ControllerCommand, ControllerHandle};
pub use capture::{CapturedRequest, RequestLog};
pub use codec::{DecodedBody, EncodedBody};
pub use config::{CaptureConfig, InterceptConfig};
pub use controller::{InterceptController, PauseOutcome, TeardownReason};
pub use correlation::{CorrelationTable, InterceptionKey, PausedInterception};
pub use editor::{ControllerLink, EditorState, EditorSurface};
pub use error::{
    AttachError, CodecError, EditorError, HostError, InterceptError, InterceptResult,
    ValidationError,
};
pub use filter::{matches, UrlMatcher};
/// Re-export the host seams
pub use host::{
    DebuggerHost, EditorLauncher, Fulfillment, HostEvent, RequestPausedEvent, ResponseBody,
};
pub use session::InterceptionSession;
pub use validation::ValidatedEdit;
