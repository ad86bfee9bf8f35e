//! Per-tab interception session state

use crate::filter::UrlMatcher;
use chrono::{DateTime, Utc};
use intercept_common::{InterceptionStatus, PresetResponse, SessionState, TabId};
use tracing::debug;

#[derive(Debug, Clone)]
struct CompiledPreset {
    preset: PresetResponse,
    matcher: UrlMatcher,
}

/// Enabled interception on one tab
#[derive(Debug, Clone)]
pub struct InterceptionSession {
    pub tab_id: TabId,
    matcher: UrlMatcher,
    presets: Vec<CompiledPreset>,
    pub enabled: bool,
    pub attached: bool,
    /// Responses paused (or answered by a preset) since enable
    pub intercepted_count: u32,
    pub max_interceptions: u32,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl InterceptionSession {
    pub fn new(tab_id: TabId, url_patterns: &[String], max_interceptions: u32) -> Self {
        Self {
            tab_id,
            matcher: UrlMatcher::new(url_patterns),
            presets: Vec::new(),
            enabled: false,
            attached: false,
            intercepted_count: 0,
            max_interceptions,
            state: SessionState::Idle,
            created_at: Utc::now(),
        }
    }

    pub fn url_patterns(&self) -> &[String] {
        self.matcher.patterns()
    }

    pub fn set_patterns(&mut self, url_patterns: &[String]) {
        self.matcher = UrlMatcher::new(url_patterns);
    }

    pub fn matches(&self, url: &str) -> bool {
        self.matcher.matches(url)
    }

    pub fn preset_responses(&self) -> Vec<PresetResponse> {
        self.presets.iter().map(|p| p.preset.clone()).collect()
    }

    pub fn set_preset_responses(&mut self, presets: Vec<PresetResponse>) {
        self.presets = presets
            .into_iter()
            .map(|preset| CompiledPreset {
                matcher: UrlMatcher::new(&[preset.url_pattern.as_str()]),
                preset,
            })
            .collect();
    }

    /// First enabled preset whose pattern matches the URL
    pub fn find_preset(&self, url: &str) -> Option<&PresetResponse> {
        self.presets
            .iter()
            .find(|p| p.preset.enabled && p.matcher.matches(url))
            .map(|p| &p.preset)
    }

    /// No further responses may be paused
    pub fn at_capacity(&self) -> bool {
        self.intercepted_count >= self.max_interceptions
    }

    /// Count has gone past the cap, so pending edits are refused
    pub fn over_limit(&self) -> bool {
        self.intercepted_count > self.max_interceptions
    }

    pub fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(tab_id = self.tab_id, from = ?self.state, to = ?next, "session state change");
            self.state = next;
        }
    }

    /// Settle on `Paused` or `Intercepting` depending on what is still held
    pub fn settle(&mut self, pending: usize) {
        if pending > 0 {
            self.transition(SessionState::Paused);
        } else {
            self.transition(SessionState::Intercepting);
        }
    }

    pub fn status(&self, pending: usize) -> InterceptionStatus {
        InterceptionStatus {
            enabled: self.enabled,
            attached_debugger: self.attached,
            intercepted_count: self.intercepted_count,
            pending_count: pending as u32,
            state: self.state,
        }
    }
}
