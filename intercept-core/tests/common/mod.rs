#![allow(dead_code)]

use async_trait::async_trait;
use intercept_common::{EditorMessage, EditorSnapshot, HeaderEntry, TabId};
use intercept_core::{
    AttachError, DebuggerHost, EditorError, EditorLauncher, Fulfillment, HostError,
    InterceptConfig, InterceptController, RequestPausedEvent, ResponseBody,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Attach(TabId),
    Detach(TabId),
    EnableInterception(TabId),
    DisableInterception(TabId),
    GetBody(TabId, String),
    Continue(TabId, String),
    Fulfill(TabId, String, Fulfillment),
}

/// Debugger host that records every call and can be told to fail
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    bodies: Mutex<HashMap<String, ResponseBody>>,
    attach_error: Mutex<Option<AttachError>>,
    dead_tabs: Mutex<HashSet<TabId>>,
    pub fail_enable: AtomicBool,
    pub fail_body: AtomicBool,
    pub fail_fulfill: AtomicBool,
}

impl RecordingHost {
    pub fn set_body(&self, request_id: &str, body: &str, is_base64: bool) {
        self.bodies.lock().unwrap().insert(
            request_id.to_string(),
            ResponseBody {
                body: body.to_string(),
                is_base64,
            },
        );
    }

    pub fn fail_attach_with(&self, err: AttachError) {
        *self.attach_error.lock().unwrap() = Some(err);
    }

    pub fn kill_tab(&self, tab_id: TabId) {
        self.dead_tabs.lock().unwrap().insert(tab_id);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn continued(&self, tab_id: TabId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Continue(tab, id) if tab == tab_id => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn fulfilled(&self, tab_id: TabId) -> Vec<(String, Fulfillment)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Fulfill(tab, id, fulfillment) if tab == tab_id => Some((id, fulfillment)),
                _ => None,
            })
            .collect()
    }

    /// How many times a request was resolved by continue or fulfill
    pub fn resolutions(&self, tab_id: TabId, request_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| match call {
                HostCall::Continue(tab, id) | HostCall::Fulfill(tab, id, _) => {
                    *tab == tab_id && id == request_id
                }
                _ => false,
            })
            .count()
    }

    pub fn count(&self, predicate: impl Fn(&HostCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DebuggerHost for RecordingHost {
    async fn attach(&self, tab_id: TabId) -> Result<(), AttachError> {
        self.record(HostCall::Attach(tab_id));
        match self.attach_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn detach(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(HostCall::Detach(tab_id));
        Ok(())
    }

    async fn enable_response_interception(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(HostCall::EnableInterception(tab_id));
        if self.fail_enable.load(Ordering::SeqCst) {
            return Err(HostError::Protocol("Fetch.enable failed".to_string()));
        }
        Ok(())
    }

    async fn disable_interception(&self, tab_id: TabId) -> Result<(), HostError> {
        self.record(HostCall::DisableInterception(tab_id));
        Ok(())
    }

    async fn get_response_body(&self, tab_id: TabId, request_id: &str) -> Result<ResponseBody, HostError> {
        self.record(HostCall::GetBody(tab_id, request_id.to_string()));
        if self.fail_body.load(Ordering::SeqCst) {
            return Err(HostError::Protocol("No resource with given identifier found".to_string()));
        }
        Ok(self
            .bodies
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn continue_request(&self, tab_id: TabId, request_id: &str) -> Result<(), HostError> {
        self.record(HostCall::Continue(tab_id, request_id.to_string()));
        Ok(())
    }

    async fn fulfill_request(
        &self,
        tab_id: TabId,
        request_id: &str,
        fulfillment: Fulfillment,
    ) -> Result<(), HostError> {
        self.record(HostCall::Fulfill(tab_id, request_id.to_string(), fulfillment));
        if self.fail_fulfill.load(Ordering::SeqCst) {
            return Err(HostError::Protocol("Invalid InterceptionId".to_string()));
        }
        Ok(())
    }

    async fn is_tab_alive(&self, tab_id: TabId) -> bool {
        !self.dead_tabs.lock().unwrap().contains(&tab_id)
    }
}

/// Editor launcher that keeps what it was asked to open
#[derive(Default)]
pub struct RecordingLauncher {
    opened: Mutex<Vec<EditorSnapshot>>,
    closed: Mutex<Vec<(TabId, String)>>,
    pub fail_open: AtomicBool,
}

impl RecordingLauncher {
    pub fn opened(&self) -> Vec<EditorSnapshot> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<(TabId, String)> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl EditorLauncher for RecordingLauncher {
    async fn open(&self, message: EditorMessage) -> Result<(), EditorError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(EditorError::Launch("window creation failed".to_string()));
        }
        let EditorMessage::LoadData(snapshot) = message;
        self.opened.lock().unwrap().push(snapshot);
        Ok(())
    }

    async fn close(&self, tab_id: TabId, request_id: &str) {
        self.closed.lock().unwrap().push((tab_id, request_id.to_string()));
    }
}

pub struct Harness {
    pub host: Arc<RecordingHost>,
    pub launcher: Arc<RecordingLauncher>,
    pub controller: InterceptController,
}

pub fn harness() -> Harness {
    harness_with(InterceptConfig::default())
}

pub fn harness_with(config: InterceptConfig) -> Harness {
    let host = Arc::new(RecordingHost::default());
    let launcher = Arc::new(RecordingLauncher::default());
    let controller = InterceptController::new(host.clone(), launcher.clone(), config);
    Harness {
        host,
        launcher,
        controller,
    }
}

pub fn json_response(tab_id: TabId, request_id: &str, url: &str) -> RequestPausedEvent {
    RequestPausedEvent::new(tab_id, request_id, url)
        .with_headers(vec![HeaderEntry::new("Content-Type", "application/json")])
}

pub fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}
