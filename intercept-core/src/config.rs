//! Configuration types and utilities

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and defaults for response interception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Tabs that may have interception enabled at the same time
    pub max_sessions: usize,
    /// URL patterns accepted per session
    pub max_patterns: usize,
    /// Characters allowed in a single URL pattern
    pub max_pattern_length: usize,
    /// Paused responses a session may create before it rejects new ones
    pub max_interceptions: u32,
    /// Largest edited body accepted for fulfillment, in bytes
    pub max_body_size: usize,
    /// Content-Type used when an edit carries none
    pub default_content_type: String,
    /// Recompress edited bodies with the original gzip/deflate encoding
    /// instead of delivering them as identity
    pub recompress_bodies: bool,
    /// Capacity of the controller's command queue
    pub channel_capacity: usize,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            max_sessions: 3,
            max_patterns: 10,
            max_pattern_length: 1000,
            max_interceptions: 50,
            max_body_size: 10 * 1024 * 1024, // 10MB
            default_content_type: "application/json; charset=utf-8".to_string(),
            recompress_bodies: false,
            channel_capacity: 256,
        }
    }
}

/// Limits for the passive request log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    /// Requests kept in memory before a cleanup pass runs
    pub max_requests_in_memory: usize,
    /// Age after which a logged request is dropped
    pub request_ttl_secs: u64,
    /// Entries removed per cleanup pass
    pub batch_cleanup_size: usize,
    /// Response text longer than this is truncated
    pub max_response_size: usize,
    /// Request body text longer than this is truncated
    pub max_request_body_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_in_memory: 100,
            request_ttl_secs: 180,
            batch_cleanup_size: 50,
            max_response_size: 50_000,
            max_request_body_size: 10_000,
        }
    }
}

impl CaptureConfig {
    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }
}
