//! Per-tab interception state machine
//!
//! `Idle -> Attaching -> Intercepting <-> Paused -> Fulfilling -> Intercepting`,
//! with `Detaching -> Idle` reachable from any state.
//!
//! The controller owns every session and the correlation table. It is driven
//! from a single task (see [`crate::actor`]) so no locking is needed; each
//! method leaves the state consistent before it awaits a host call.

use crate::codec::{self, DecodedBody};
use crate::config::InterceptConfig;
use crate::correlation::{CorrelationTable, InterceptionKey, PausedInterception};
use crate::error::{CodecError, HostError, InterceptError, InterceptResult, ValidationError};
use crate::host::{DebuggerHost, EditorLauncher, Fulfillment, HostEvent, RequestPausedEvent};
use crate::session::InterceptionSession;
use crate::validation::{self, ValidatedEdit};
use chrono::Utc;
use intercept_common::headers::{header_value, remove_header};
use intercept_common::{
    BodyKind, CommandResult, ContentEncoding, ControlRequest, ControlResponse, EditorMessage,
    HeaderEntry, InterceptionStatus, PresetResponse, SessionState, SubmitEditPayload, TabId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to a paused response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseOutcome {
    /// Resumed unmodified
    PassedThrough,
    /// Held for an editor
    Paused,
    /// Answered by a preset response
    PresetFulfilled { preset_id: String },
    /// Same (tab, request) is already held; the held entry resolves it
    Duplicate,
    /// The tab disappeared; its session was torn down
    TabGone,
}

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    Disabled,
    DebuggerDetached,
    TabClosed,
    Shutdown,
}

impl TeardownReason {
    /// Whether the debugging session can still take commands
    fn host_reachable(self) -> bool {
        matches!(self, TeardownReason::Disabled | TeardownReason::Shutdown)
    }
}

pub struct InterceptController {
    host: Arc<dyn DebuggerHost>,
    launcher: Arc<dyn EditorLauncher>,
    config: InterceptConfig,
    sessions: HashMap<TabId, InterceptionSession>,
    table: CorrelationTable,
}

impl InterceptController {
    pub fn new(
        host: Arc<dyn DebuggerHost>,
        launcher: Arc<dyn EditorLauncher>,
        config: InterceptConfig,
    ) -> Self {
        Self {
            host,
            launcher,
            config,
            sessions: HashMap::new(),
            table: CorrelationTable::new(),
        }
    }

    pub fn config(&self) -> &InterceptConfig {
        &self.config
    }

    pub fn session(&self, tab_id: TabId) -> Option<&InterceptionSession> {
        self.sessions.get(&tab_id)
    }

    pub fn paused(&self, tab_id: TabId, request_id: &str) -> Option<&PausedInterception> {
        self.table.get(tab_id, request_id)
    }

    pub fn pending_keys(&self) -> Vec<InterceptionKey> {
        self.table.all_keys()
    }

    pub fn active_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self.sessions.keys().copied().collect();
        tabs.sort_unstable();
        tabs
    }

    /// Start intercepting responses on a tab.
    ///
    /// Every capacity and validation check runs before the first host call,
    /// and a failed host step leaves no session behind.
    pub async fn enable(&mut self, tab_id: TabId, url_patterns: Vec<String>) -> InterceptResult<()> {
        if self.sessions.contains_key(&tab_id) {
            return Err(InterceptError::AlreadyEnabled(tab_id));
        }
        if self.sessions.len() >= self.config.max_sessions {
            warn!(tab_id, max = self.config.max_sessions, "rejecting enable, session ceiling reached");
            return Err(InterceptError::TooManySessions {
                max: self.config.max_sessions,
            });
        }
        validation::validate_patterns(&url_patterns, &self.config)?;

        let mut session =
            InterceptionSession::new(tab_id, &url_patterns, self.config.max_interceptions);
        session.transition(SessionState::Attaching);

        if let Err(err) = self.host.attach(tab_id).await {
            warn!(tab_id, error = %err, "attach failed");
            return Err(err.into());
        }
        session.attached = true;

        if let Err(err) = self.host.enable_response_interception(tab_id).await {
            error!(tab_id, error = %err, "enabling response interception failed, detaching");
            if let Err(detach_err) = self.host.detach(tab_id).await {
                warn!(tab_id, error = %detach_err, "detach after failed enable also failed");
            }
            return Err(err.into());
        }

        session.enabled = true;
        session.transition(SessionState::Intercepting);
        self.sessions.insert(tab_id, session);

        info!(tab_id, patterns = ?url_patterns, "interception enabled");
        Ok(())
    }

    pub async fn disable(&mut self, tab_id: TabId) -> InterceptResult<()> {
        if !self.sessions.contains_key(&tab_id) {
            return Err(InterceptError::NotEnabled(tab_id));
        }
        self.teardown(tab_id, TeardownReason::Disabled).await;
        Ok(())
    }

    pub fn update_patterns(&mut self, tab_id: TabId, url_patterns: Vec<String>) -> InterceptResult<()> {
        validation::validate_patterns(&url_patterns, &self.config)?;
        let session = self
            .sessions
            .get_mut(&tab_id)
            .ok_or(InterceptError::NotEnabled(tab_id))?;

        session.set_patterns(&url_patterns);
        info!(tab_id, patterns = ?url_patterns, "patterns updated");
        Ok(())
    }

    pub fn update_preset_responses(
        &mut self,
        tab_id: TabId,
        presets: Vec<PresetResponse>,
    ) -> InterceptResult<()> {
        for preset in &presets {
            validation::validate_patterns(std::slice::from_ref(&preset.url_pattern), &self.config)?;
            if !(100..=599).contains(&preset.status_code) {
                return Err(ValidationError::InvalidStatus(preset.status_code.to_string()).into());
            }
        }

        let session = self
            .sessions
            .get_mut(&tab_id)
            .ok_or(InterceptError::NotEnabled(tab_id))?;

        info!(tab_id, count = presets.len(), "preset responses updated");
        session.set_preset_responses(presets);
        Ok(())
    }

    /// Status of a tab; unknown tabs report everything off
    pub fn status(&self, tab_id: TabId) -> InterceptionStatus {
        let pending = self.table.count_for_tab(tab_id);
        match self.sessions.get(&tab_id) {
            Some(session) => session.status(pending),
            None => InterceptionStatus {
                pending_count: pending as u32,
                ..Default::default()
            },
        }
    }

    pub async fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::RequestPaused(event) => {
                self.on_request_paused(event).await;
            }
            HostEvent::DebuggerDetached { tab_id, reason } => {
                self.on_debugger_detached(tab_id, &reason).await;
            }
            HostEvent::TabClosed { tab_id } => self.on_tab_closed(tab_id).await,
        }
    }

    /// Decide what to do with a paused response.
    ///
    /// Every path ends with the response either held in the table or resolved
    /// through the host, even when a step in between fails.
    pub async fn on_request_paused(&mut self, event: RequestPausedEvent) -> PauseOutcome {
        let tab_id = event.tab_id;
        let request_id = event.request_id.clone();

        match self.intercept(event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(tab_id, request_id = %request_id, error = %err, "interception failed, passing response through");
                self.table.remove(tab_id, &request_id);
                self.resume(tab_id, &request_id).await;
                if let Some(session) = self.sessions.get_mut(&tab_id) {
                    session.settle(self.table.count_for_tab(tab_id));
                }
                PauseOutcome::PassedThrough
            }
        }
    }

    async fn intercept(&mut self, event: RequestPausedEvent) -> InterceptResult<PauseOutcome> {
        let tab_id = event.tab_id;

        let Some(session) = self.sessions.get(&tab_id).filter(|s| s.enabled) else {
            debug!(tab_id, request_id = %event.request_id, "no active session, passing through");
            self.resume(tab_id, &event.request_id).await;
            return Ok(PauseOutcome::PassedThrough);
        };

        if !event.has_response() || !session.matches(&event.url) {
            debug!(tab_id, url = %event.url, "not selected, passing through");
            self.resume(tab_id, &event.request_id).await;
            return Ok(PauseOutcome::PassedThrough);
        }

        if self.table.contains(tab_id, &event.request_id) {
            warn!(tab_id, request_id = %event.request_id, "request already paused, ignoring repeat notification");
            return Ok(PauseOutcome::Duplicate);
        }

        if session.at_capacity() {
            return Err(InterceptError::InterceptionLimit {
                tab_id,
                max: session.max_interceptions,
            });
        }

        if let Some(preset) = session.find_preset(&event.url).cloned() {
            return self.fulfill_with_preset(&event, preset).await;
        }

        if !self.host.is_tab_alive(tab_id).await {
            self.teardown(tab_id, TeardownReason::TabClosed).await;
            return Ok(PauseOutcome::TabGone);
        }

        let raw = self.host.get_response_body(tab_id, &event.request_id).await?;
        let body = codec::decode(
            &raw.body,
            raw.is_base64,
            codec::detect_content_encoding(&event.response_headers),
        );
        if let Some(reason) = &body.error {
            debug!(tab_id, request_id = %event.request_id, reason = %reason, "body decoded with fallback");
        }

        let paused = PausedInterception {
            request_id: event.request_id.clone(),
            tab_id,
            url: event.url.clone(),
            method: event.method.clone(),
            status: event.response_status.unwrap_or(200),
            headers: event.response_headers.clone(),
            body,
            created_at: Utc::now(),
            edit: None,
        };
        let snapshot = paused.snapshot();
        self.table.put(paused)?;

        self.launcher.open(EditorMessage::LoadData(snapshot)).await?;

        if let Some(session) = self.sessions.get_mut(&tab_id) {
            session.intercepted_count += 1;
            session.transition(SessionState::Paused);
            info!(
                tab_id,
                request_id = %event.request_id,
                url = %event.url,
                intercepted = session.intercepted_count,
                "response paused for editing"
            );
        }

        Ok(PauseOutcome::Paused)
    }

    async fn fulfill_with_preset(
        &mut self,
        event: &RequestPausedEvent,
        preset: PresetResponse,
    ) -> InterceptResult<PauseOutcome> {
        let tab_id = event.tab_id;

        let mut headers = preset.headers.clone();
        let encoded = codec::encode(&preset.response_body, BodyKind::Text, ContentEncoding::Identity)?;
        finish_headers(&mut headers, encoded.content_length, &self.config.default_content_type);

        let fulfillment = Fulfillment {
            status: preset.status_code,
            headers,
            body_base64: encoded.base64,
        };
        self.host
            .fulfill_request(tab_id, &event.request_id, fulfillment)
            .await?;

        if let Some(session) = self.sessions.get_mut(&tab_id) {
            session.intercepted_count += 1;
        }
        info!(tab_id, request_id = %event.request_id, preset = %preset.id, "response answered by preset");

        Ok(PauseOutcome::PresetFulfilled { preset_id: preset.id })
    }

    /// Apply an editor's replacement to a paused response.
    ///
    /// A validation failure leaves the paused entry in place so the editor
    /// can correct and resubmit. Returns non-blocking warnings.
    pub async fn submit_edit(
        &mut self,
        tab_id: TabId,
        request_id: &str,
        payload: SubmitEditPayload,
    ) -> InterceptResult<Vec<String>> {
        let session = self
            .sessions
            .get(&tab_id)
            .ok_or(InterceptError::NotEnabled(tab_id))?;
        let entry = self
            .table
            .get(tab_id, request_id)
            .ok_or_else(|| InterceptError::NotFound {
                tab_id,
                request_id: request_id.to_string(),
            })?;

        let edit = validation::validate_edit(&payload, &self.config)?;
        for warning in &edit.warnings {
            warn!(tab_id, request_id, "{}", warning);
        }

        if session.over_limit() {
            let max = session.max_interceptions;
            self.abandon(tab_id, request_id).await;
            return Err(InterceptError::InterceptionLimit { tab_id, max });
        }

        let fulfillment = build_fulfillment(entry, &edit, &self.config)?;

        if !self.host.is_tab_alive(tab_id).await {
            self.teardown(tab_id, TeardownReason::TabClosed).await;
            return Err(InterceptError::TabClosed(tab_id));
        }

        if let Some(entry) = self.table.get_mut(tab_id, request_id) {
            entry.edit = Some(edit.clone());
        }
        if let Some(session) = self.sessions.get_mut(&tab_id) {
            session.transition(SessionState::Fulfilling);
        }

        let result = self
            .host
            .fulfill_request(tab_id, request_id, fulfillment)
            .await;

        self.table.remove(tab_id, request_id);
        if let Err(err) = &result {
            error!(tab_id, request_id, error = %err, "fulfill failed, resuming original response");
            self.resume(tab_id, request_id).await;
        }
        self.launcher.close(tab_id, request_id).await;
        if let Some(session) = self.sessions.get_mut(&tab_id) {
            session.settle(self.table.count_for_tab(tab_id));
        }

        result?;
        info!(tab_id, request_id, "edited response delivered");
        Ok(edit.warnings)
    }

    /// Editor went away without submitting: resume the original response
    pub async fn on_editor_closed(&mut self, tab_id: TabId, request_id: &str) -> InterceptResult<()> {
        if !self.table.contains(tab_id, request_id) {
            return Err(InterceptError::NotFound {
                tab_id,
                request_id: request_id.to_string(),
            });
        }

        if !self.host.is_tab_alive(tab_id).await {
            self.teardown(tab_id, TeardownReason::TabClosed).await;
            return Ok(());
        }

        debug!(tab_id, request_id, "editor closed without edit");
        self.abandon(tab_id, request_id).await;
        Ok(())
    }

    pub async fn on_debugger_detached(&mut self, tab_id: TabId, reason: &str) {
        info!(tab_id, reason, "debugger detached by host");
        self.teardown(tab_id, TeardownReason::DebuggerDetached).await;
    }

    pub async fn on_tab_closed(&mut self, tab_id: TabId) {
        info!(tab_id, "tab closed");
        self.teardown(tab_id, TeardownReason::TabClosed).await;
    }

    /// Resume and drop table entries that no longer belong to a session
    pub async fn purge_orphans(&mut self) -> usize {
        let sessions = &self.sessions;
        let orphans = self.table.purge_orphans(|tab_id| sessions.contains_key(&tab_id));

        for orphan in &orphans {
            warn!(tab_id = orphan.tab_id, request_id = %orphan.request_id, "purging orphaned paused response");
            self.launcher.close(orphan.tab_id, &orphan.request_id).await;
            if self.host.is_tab_alive(orphan.tab_id).await {
                self.resume(orphan.tab_id, &orphan.request_id).await;
            }
        }
        orphans.len()
    }

    /// Resume everything and release every tab
    pub async fn shutdown(&mut self) {
        let tabs = self.active_tabs();
        info!(sessions = tabs.len(), "shutting down interception");
        for tab_id in tabs {
            self.teardown(tab_id, TeardownReason::Shutdown).await;
        }
        self.purge_orphans().await;
    }

    /// Handle one control-surface message
    pub async fn dispatch(&mut self, request: ControlRequest) -> ControlResponse {
        let result = match request {
            ControlRequest::EnableInterception {
                tab_id,
                url_patterns,
            } => self
                .enable(tab_id, url_patterns)
                .await
                .map(|_| CommandResult::ok_with_message("Interception enabled")),
            ControlRequest::DisableInterception { tab_id } => self
                .disable(tab_id)
                .await
                .map(|_| CommandResult::ok_with_message("Interception disabled")),
            ControlRequest::UpdatePatterns {
                tab_id,
                url_patterns,
            } => self
                .update_patterns(tab_id, url_patterns)
                .map(|_| CommandResult::ok()),
            ControlRequest::UpdatePresetResponses {
                tab_id,
                preset_responses,
            } => self
                .update_preset_responses(tab_id, preset_responses)
                .map(|_| CommandResult::ok()),
            ControlRequest::GetStatus { tab_id } => return self.status(tab_id).into(),
            ControlRequest::SubmitEdit {
                tab_id,
                request_id,
                status,
                headers,
                body,
            } => self
                .submit_edit(tab_id, &request_id, SubmitEditPayload { status, headers, body })
                .await
                .map(|warnings| CommandResult::ok().with_warnings(warnings)),
        };

        match result {
            Ok(result) => result.into(),
            Err(err) => {
                debug!(error = %err, "control request failed");
                err.to_result().into()
            }
        }
    }

    /// Shared cleanup for disable, detach, tab close and shutdown.
    ///
    /// Safe on tabs without a session; late events are absorbed.
    pub async fn teardown(&mut self, tab_id: TabId, reason: TeardownReason) -> usize {
        let session = self.sessions.remove(&tab_id);
        let pending = self.table.remove_all_for_tab(tab_id);

        if session.is_none() && pending.is_empty() {
            debug!(tab_id, ?reason, "teardown for unknown tab ignored");
            return 0;
        }

        if let Some(mut session) = session {
            session.transition(SessionState::Detaching);
        }

        let reachable = reason.host_reachable() && self.host.is_tab_alive(tab_id).await;

        for entry in &pending {
            self.launcher.close(tab_id, &entry.request_id).await;
            if reachable {
                self.resume(tab_id, &entry.request_id).await;
            }
        }

        if reachable {
            if let Err(err) = self.host.disable_interception(tab_id).await {
                warn!(tab_id, error = %err, "disabling interception failed");
            }
            if let Err(err) = self.host.detach(tab_id).await {
                warn!(tab_id, error = %err, "detach failed");
            }
        }

        info!(tab_id, ?reason, released = pending.len(), "interception session closed");
        pending.len()
    }

    /// Drop an entry, resume its response and close its editor
    async fn abandon(&mut self, tab_id: TabId, request_id: &str) {
        self.table.remove(tab_id, request_id);
        self.resume(tab_id, request_id).await;
        self.launcher.close(tab_id, request_id).await;
        if let Some(session) = self.sessions.get_mut(&tab_id) {
            session.settle(self.table.count_for_tab(tab_id));
        }
    }

    /// Pass-through; failures are logged since there is nothing left to try
    async fn resume(&self, tab_id: TabId, request_id: &str) {
        match self.host.continue_request(tab_id, request_id).await {
            Ok(()) => debug!(tab_id, request_id, "response resumed"),
            Err(HostError::TargetClosed) => {
                debug!(tab_id, request_id, "tab gone before resume")
            }
            Err(err) => error!(tab_id, request_id, error = %err, "failed to resume response"),
        }
    }
}

/// Assemble the replacement response for a paused entry.
///
/// Compressed bodies that could not be read are sent back in their original
/// encoding; otherwise the body goes out as identity unless recompression is
/// configured.
fn build_fulfillment(
    entry: &PausedInterception,
    edit: &ValidatedEdit,
    config: &InterceptConfig,
) -> InterceptResult<Fulfillment> {
    let body: &DecodedBody = &entry.body;
    let text = edit.body.as_deref().unwrap_or(&body.text);
    let mut headers = edit.headers.clone().unwrap_or_else(|| entry.headers.clone());

    let keep_wire_encoding = body.is_compressed;
    let target = if !keep_wire_encoding
        && config.recompress_bodies
        && matches!(body.encoding, ContentEncoding::Gzip | ContentEncoding::Deflate)
    {
        body.encoding
    } else {
        ContentEncoding::Identity
    };

    let encoded = codec::encode(text, body.kind, target).map_err(|err| match err {
        CodecError::Base64(err) => InterceptError::from(ValidationError::InvalidBinaryBody(err.to_string())),
        other => InterceptError::from(other),
    })?;

    if !keep_wire_encoding {
        remove_header(&mut headers, "content-encoding");
        if encoded.encoding.is_compressed() {
            headers.push(HeaderEntry::new("Content-Encoding", encoded.encoding.as_str()));
        }
    }
    finish_headers(&mut headers, encoded.content_length, &config.default_content_type);

    Ok(Fulfillment {
        status: edit.status.unwrap_or(entry.status),
        headers,
        body_base64: encoded.base64,
    })
}

/// Default the content type and replace any stale length
fn finish_headers(headers: &mut Vec<HeaderEntry>, content_length: usize, default_content_type: &str) {
    if header_value(headers, "content-type").is_none() {
        headers.push(HeaderEntry::new("Content-Type", default_content_type));
    }
    remove_header(headers, "content-length");
    headers.push(HeaderEntry::new("Content-Length", content_length.to_string()));
}
