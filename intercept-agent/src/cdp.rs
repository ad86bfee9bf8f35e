//! Chrome DevTools host
//!
//! Implements [`DebuggerHost`] over chromiumoxide. Each registered page gets a
//! numeric tab id. While a tab is attached, pumps forward `Fetch.requestPaused`
//! and `Inspector.detached` into the controller; a browser-wide watcher
//! reports destroyed targets as closed tabs. Network events of every tab feed
//! the passive request log.

use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FulfillRequestParams, GetResponseBodyParams,
    RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::inspector::{self, EventDetached};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::target::{EventTargetDestroyed, TargetId};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, Page};
use dashmap::DashMap;
use futures::StreamExt;
use intercept_common::{ContentEncoding, HeaderEntry, TabId};
use intercept_core::host::headers_from_value;
use intercept_core::{
    codec, AttachError, CapturedRequest, DebuggerHost, Fulfillment, HostError, HostEvent,
    RequestLog, RequestPausedEvent, ResponseBody,
};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tab as listed to the inspector UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub tab_id: TabId,
    pub url: Option<String>,
    pub attached: bool,
}

struct TabEntry {
    page: Page,
    target_id: TargetId,
    capture: Option<JoinHandle<()>>,
}

impl TabEntry {
    fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
    }
}

/// Event pumps of one attached debugging session
struct DebugSession {
    paused: JoinHandle<()>,
    detached: JoinHandle<()>,
}

impl DebugSession {
    fn abort(self) {
        self.paused.abort();
        self.detached.abort();
    }
}

/// Attached tabs, shared with the detach pumps so a browser-side detach
/// clears its own session
#[derive(Clone, Default)]
struct DebugSessions(Arc<DashMap<TabId, DebugSession>>);

impl DebugSessions {
    fn is_attached(&self, tab_id: TabId) -> bool {
        self.0.contains_key(&tab_id)
    }

    fn insert(&self, tab_id: TabId, session: DebugSession) {
        if let Some(stale) = self.0.insert(tab_id, session) {
            stale.abort();
        }
    }

    /// Stop both pumps of a session we are closing ourselves
    fn release(&self, tab_id: TabId) -> bool {
        match self.0.remove(&tab_id) {
            Some((_, session)) => {
                session.abort();
                true
            }
            None => false,
        }
    }

    /// The browser ended the session. Runs on the detach pump, which is left
    /// to finish on its own.
    fn detached_by_browser(&self, tab_id: TabId) {
        if let Some((_, session)) = self.0.remove(&tab_id) {
            session.paused.abort();
        }
    }
}

pub struct CdpHost {
    browser: Mutex<Browser>,
    /// Close the browser on shutdown; a browser we only connected to stays open
    owns_browser: bool,
    tabs: DashMap<TabId, TabEntry>,
    sessions: DebugSessions,
    next_tab_id: AtomicI64,
    events: mpsc::Sender<HostEvent>,
    log: Arc<RwLock<RequestLog>>,
}

impl CdpHost {
    pub fn new(
        browser: Browser,
        owns_browser: bool,
        log: Arc<RwLock<RequestLog>>,
        events: mpsc::Sender<HostEvent>,
    ) -> Self {
        Self {
            browser: Mutex::new(browser),
            owns_browser,
            tabs: DashMap::new(),
            sessions: DebugSessions::default(),
            next_tab_id: AtomicI64::new(1),
            events,
            log,
        }
    }

    /// Register every page the browser already has
    pub async fn discover_tabs(&self) -> AgentResult<Vec<TabId>> {
        let pages = {
            let mut browser = self.browser.lock().await;
            browser.fetch_targets().await?;
            browser.pages().await?
        };

        let mut added = Vec::new();
        for page in pages {
            let known = self
                .tabs
                .iter()
                .any(|entry| entry.value().target_id == *page.target_id());
            if !known {
                added.push(self.register_page(page).await);
            }
        }
        Ok(added)
    }

    pub async fn open_tab(&self, url: &str) -> AgentResult<TabId> {
        let page = {
            let browser = self.browser.lock().await;
            browser.new_page(url).await?
        };
        Ok(self.register_page(page).await)
    }

    pub async fn register_page(&self, page: Page) -> TabId {
        let tab_id = self.next_tab_id.fetch_add(1, Ordering::SeqCst);
        let target_id = page.target_id().clone();

        let logging = self.log.read().await.config().enabled;
        let capture = match logging {
            true => match start_capture(tab_id, page.clone(), self.log.clone()).await {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(tab_id, error = %err, "request logging unavailable for tab");
                    None
                }
            },
            false => None,
        };

        info!(tab_id, target_id = ?target_id, "tab registered");
        self.tabs.insert(
            tab_id,
            TabEntry {
                page,
                target_id,
                capture,
            },
        );
        tab_id
    }

    pub async fn tabs(&self) -> Vec<TabInfo> {
        let pages: Vec<(TabId, Page, bool)> = self
            .tabs
            .iter()
            .map(|entry| {
                let tab_id = *entry.key();
                (tab_id, entry.value().page.clone(), self.sessions.is_attached(tab_id))
            })
            .collect();

        let mut tabs = Vec::with_capacity(pages.len());
        for (tab_id, page, attached) in pages {
            let url = page.url().await.ok().flatten();
            tabs.push(TabInfo { tab_id, url, attached });
        }
        tabs.sort_by_key(|tab| tab.tab_id);
        tabs
    }

    /// Report destroyed targets as closed tabs
    pub async fn watch_targets(self: &Arc<Self>) -> AgentResult<JoinHandle<()>> {
        let mut destroyed = {
            let browser = self.browser.lock().await;
            browser.event_listener::<EventTargetDestroyed>().await?
        };

        let host = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while let Some(event) = destroyed.next().await {
                let Some(tab_id) = host.tab_for_target(&event.target_id) else {
                    continue;
                };
                host.forget_tab(tab_id);
                info!(tab_id, "tab closed");
                if host.events.send(HostEvent::TabClosed { tab_id }).await.is_err() {
                    break;
                }
            }
        }))
    }

    pub async fn close(&self) {
        let tab_ids: Vec<TabId> = self.tabs.iter().map(|entry| *entry.key()).collect();
        for tab_id in tab_ids {
            self.forget_tab(tab_id);
        }

        if self.owns_browser {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "browser did not close cleanly");
            }
            let _ = browser.wait().await;
        }
    }

    fn forget_tab(&self, tab_id: TabId) {
        if let Some((_, mut entry)) = self.tabs.remove(&tab_id) {
            entry.stop();
        }
        self.sessions.release(tab_id);
    }

    fn tab_for_target(&self, target_id: &TargetId) -> Option<TabId> {
        self.tabs
            .iter()
            .find(|entry| entry.value().target_id == *target_id)
            .map(|entry| *entry.key())
    }

    fn page(&self, tab_id: TabId) -> Result<Page, HostError> {
        self.tabs
            .get(&tab_id)
            .map(|entry| entry.value().page.clone())
            .ok_or(HostError::TargetClosed)
    }
}

#[async_trait]
impl DebuggerHost for CdpHost {
    async fn attach(&self, tab_id: TabId) -> Result<(), AttachError> {
        let page = self.page(tab_id).map_err(|_| AttachError::TargetClosed)?;
        if self.sessions.is_attached(tab_id) {
            return Ok(());
        }

        let attach_error = |err: CdpError| AttachError::classify(&err.to_string());
        let paused = page.event_listener::<EventRequestPaused>().await.map_err(attach_error)?;
        let detached = page.event_listener::<EventDetached>().await.map_err(attach_error)?;
        page.execute(inspector::EnableParams::default())
            .await
            .map_err(attach_error)?;

        let session = DebugSession {
            paused: tokio::spawn(forward_paused(tab_id, paused, self.events.clone())),
            detached: tokio::spawn(forward_detached(
                tab_id,
                detached,
                self.sessions.clone(),
                self.events.clone(),
            )),
        };

        if !self.tabs.contains_key(&tab_id) {
            session.abort();
            return Err(AttachError::TargetClosed);
        }
        self.sessions.insert(tab_id, session);
        debug!(tab_id, "debugger attached");
        Ok(())
    }

    async fn detach(&self, tab_id: TabId) -> Result<(), HostError> {
        if self.sessions.release(tab_id) {
            debug!(tab_id, "debugger detached");
        }
        Ok(())
    }

    async fn enable_response_interception(&self, tab_id: TabId) -> Result<(), HostError> {
        let params = fetch::EnableParams {
            handle_auth_requests: Some(false),
            patterns: Some(vec![RequestPattern {
                url_pattern: Some("*".into()),
                resource_type: None,
                request_stage: Some(RequestStage::Response),
            }]),
        };
        self.page(tab_id)?.execute(params).await.map_err(host_error)?;
        Ok(())
    }

    async fn disable_interception(&self, tab_id: TabId) -> Result<(), HostError> {
        self.page(tab_id)?
            .execute(fetch::DisableParams::default())
            .await
            .map_err(host_error)?;
        Ok(())
    }

    async fn get_response_body(&self, tab_id: TabId, request_id: &str) -> Result<ResponseBody, HostError> {
        let returns = self
            .page(tab_id)?
            .execute(GetResponseBodyParams::new(fetch::RequestId::new(request_id)))
            .await
            .map_err(host_error)?;
        Ok(ResponseBody {
            body: returns.body.clone(),
            is_base64: returns.base64_encoded,
        })
    }

    async fn continue_request(&self, tab_id: TabId, request_id: &str) -> Result<(), HostError> {
        self.page(tab_id)?
            .execute(ContinueRequestParams::new(fetch::RequestId::new(request_id)))
            .await
            .map_err(host_error)?;
        Ok(())
    }

    async fn fulfill_request(
        &self,
        tab_id: TabId,
        request_id: &str,
        fulfillment: Fulfillment,
    ) -> Result<(), HostError> {
        let mut params =
            FulfillRequestParams::new(fetch::RequestId::new(request_id), i64::from(fulfillment.status));
        params.response_headers = Some(
            fulfillment
                .headers
                .into_iter()
                .map(|header| fetch::HeaderEntry::new(header.name, header.value))
                .collect(),
        );
        params.body = Some(fulfillment.body_base64.into());

        self.page(tab_id)?.execute(params).await.map_err(host_error)?;
        Ok(())
    }

    async fn is_tab_alive(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }
}

fn host_error(err: CdpError) -> HostError {
    classify_host_message(err.to_string())
}

fn classify_host_message(message: String) -> HostError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("target closed") || lower.contains("no target with") {
        HostError::TargetClosed
    } else {
        HostError::Protocol(message)
    }
}

async fn forward_paused(
    tab_id: TabId,
    mut stream: chromiumoxide::listeners::EventStream<EventRequestPaused>,
    events: mpsc::Sender<HostEvent>,
) {
    while let Some(event) = stream.next().await {
        if events.send(HostEvent::RequestPaused(paused_event(tab_id, &event))).await.is_err() {
            break;
        }
    }
}

async fn forward_detached(
    tab_id: TabId,
    mut stream: chromiumoxide::listeners::EventStream<EventDetached>,
    sessions: DebugSessions,
    events: mpsc::Sender<HostEvent>,
) {
    if let Some(event) = stream.next().await {
        let reason = event.reason.clone();
        info!(tab_id, reason = %reason, "debugger detached by the browser");
        // Cleared before reporting so a re-enable attaches afresh
        sessions.detached_by_browser(tab_id);
        let _ = events.send(HostEvent::DebuggerDetached { tab_id, reason }).await;
    }
}

/// Normalize a CDP pause into the controller's event shape
fn paused_event(tab_id: TabId, event: &EventRequestPaused) -> RequestPausedEvent {
    let headers = event
        .response_headers
        .as_ref()
        .map(|headers| {
            headers
                .iter()
                .map(|header| HeaderEntry::new(header.name.as_str(), header.value.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut paused = RequestPausedEvent::new(tab_id, event.request_id.inner().clone(), event.request.url.clone())
        .with_method(event.request.method.clone())
        .with_status(event.response_status_code.and_then(|code| u16::try_from(code).ok()))
        .with_headers(headers);
    paused.resource_type = Some(event.resource_type.as_ref().to_string());
    if let Some(reason) = &event.response_error_reason {
        paused = paused.with_error_reason(reason.as_ref());
    }
    paused
}

/// Feed one tab's network events into the request log
async fn start_capture(tab_id: TabId, page: Page, log: Arc<RwLock<RequestLog>>) -> AgentResult<JoinHandle<()>> {
    let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
    let mut received = page.event_listener::<EventResponseReceived>().await?;
    let mut failed = page.event_listener::<EventLoadingFailed>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    page.execute(network::EnableParams::default()).await?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = sent.next() => on_request_sent(tab_id, &page, &log, &event).await,
                Some(event) = received.next() => {
                    let id = capture_id(tab_id, event.request_id.inner());
                    let status = u16::try_from(event.response.status).unwrap_or_default();
                    let headers = headers_from_value(event.response.headers.inner());
                    let from_cache = event.response.from_disk_cache.unwrap_or(false);
                    log.write().await.record_response(&id, status, headers, from_cache);
                }
                Some(event) = failed.next() => {
                    let id = capture_id(tab_id, event.request_id.inner());
                    log.write().await.record_error(&id, event.error_text.clone());
                }
                Some(event) = finished.next() => on_loading_finished(tab_id, &page, &log, &event).await,
                else => break,
            }
        }
        debug!(tab_id, "request logging stopped");
    }))
}

async fn on_request_sent(tab_id: TabId, page: &Page, log: &RwLock<RequestLog>, event: &EventRequestWillBeSent) {
    let resource_type = event.r#type.as_ref().map(|kind| kind.as_ref().to_string());
    if !log
        .read()
        .await
        .should_capture(&event.request.url, resource_type.as_deref())
    {
        return;
    }

    let mut request = CapturedRequest::new(
        capture_id(tab_id, event.request_id.inner()),
        Some(tab_id),
        event.request.url.clone(),
        event.request.method.clone(),
    );
    request.resource_type = resource_type;
    request.request_headers = headers_from_value(event.request.headers.inner());
    if event.request.has_post_data == Some(true) {
        let params = network::GetRequestPostDataParams::new(event.request_id.clone());
        if let Ok(returns) = page.execute(params).await {
            request.request_body = Some(returns.post_data.clone());
        }
    }
    log.write().await.record_request(request);
}

async fn on_loading_finished(tab_id: TabId, page: &Page, log: &RwLock<RequestLog>, event: &EventLoadingFinished) {
    let id = capture_id(tab_id, event.request_id.inner());
    if log.read().await.get(&id).is_none() {
        return;
    }

    let params = network::GetResponseBodyParams::new(event.request_id.clone());
    match page.execute(params).await {
        Ok(returns) => {
            let decoded = codec::decode(&returns.body, returns.base64_encoded, ContentEncoding::Identity);
            log.write().await.record_body(&id, decoded.text);
        }
        Err(err) => debug!(tab_id, request_id = %id, error = %err, "response body unavailable"),
    }
}

/// Network request ids repeat across tabs
fn capture_id(tab_id: TabId, request_id: &str) -> String {
    format!("{}:{}", tab_id, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_ids_are_scoped_to_tab() {
        assert_eq!(capture_id(3, "1000.12"), "3:1000.12");
        assert_ne!(capture_id(1, "7"), capture_id(2, "7"));
    }

    #[test]
    fn test_protocol_errors_are_classified() {
        let closed = classify_host_message("Target closed.".to_string());
        assert_eq!(closed, HostError::TargetClosed);

        let other = classify_host_message("Invalid InterceptionId.".to_string());
        assert!(matches!(other, HostError::Protocol(_)));
    }

    /// Session whose paused pump drops `alive` when it is aborted
    fn session(alive: tokio::sync::oneshot::Sender<()>) -> DebugSession {
        DebugSession {
            paused: tokio::spawn(async move {
                let _alive = alive;
                std::future::pending::<()>().await;
            }),
            detached: tokio::spawn(async {}),
        }
    }

    #[tokio::test]
    async fn test_browser_detach_allows_reattach() {
        let sessions = DebugSessions::default();
        let (alive, stopped) = tokio::sync::oneshot::channel();
        sessions.insert(4, session(alive));
        assert!(sessions.is_attached(4));

        sessions.detached_by_browser(4);
        assert!(!sessions.is_attached(4));
        assert!(stopped.await.is_err());

        // Re-enabling the tab must find no leftover session
        let (alive, mut running) = tokio::sync::oneshot::channel();
        sessions.insert(4, session(alive));
        assert!(sessions.is_attached(4));
        assert!(running.try_recv().is_err());
        assert!(sessions.release(4));
    }

    #[tokio::test]
    async fn test_release_stops_session() {
        let sessions = DebugSessions::default();
        let (alive, stopped) = tokio::sync::oneshot::channel();
        sessions.insert(9, session(alive));

        assert!(sessions.release(9));
        assert!(stopped.await.is_err());
        assert!(!sessions.release(9));
        assert!(!sessions.is_attached(9));
    }
}
