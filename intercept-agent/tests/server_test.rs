use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use intercept_agent::cdp::TabInfo;
use intercept_agent::editor_queue::QueuedEditorLauncher;
use intercept_agent::replay::Replayer;
use intercept_agent::server::{router, AppState, TabDirectory};
use intercept_agent::{AgentError, AgentResult};
use intercept_common::{HeaderEntry, TabId};
use intercept_core::{
    actor, AttachError, CaptureConfig, CapturedRequest, ControllerHandle, DebuggerHost, Fulfillment,
    HostError, HostEvent, InterceptConfig, InterceptController, RequestLog, RequestPausedEvent,
    ResponseBody,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

/// Host that serves one JSON body and remembers how requests were resolved
#[derive(Default)]
struct StubHost {
    resolved: Mutex<Vec<(String, Option<Fulfillment>)>>,
}

#[async_trait]
impl DebuggerHost for StubHost {
    async fn attach(&self, _tab_id: TabId) -> Result<(), AttachError> {
        Ok(())
    }

    async fn detach(&self, _tab_id: TabId) -> Result<(), HostError> {
        Ok(())
    }

    async fn enable_response_interception(&self, _tab_id: TabId) -> Result<(), HostError> {
        Ok(())
    }

    async fn disable_interception(&self, _tab_id: TabId) -> Result<(), HostError> {
        Ok(())
    }

    async fn get_response_body(&self, _tab_id: TabId, _request_id: &str) -> Result<ResponseBody, HostError> {
        Ok(ResponseBody {
            body: r#"{"ok":true}"#.to_string(),
            is_base64: false,
        })
    }

    async fn continue_request(&self, _tab_id: TabId, request_id: &str) -> Result<(), HostError> {
        self.resolved.lock().unwrap().push((request_id.to_string(), None));
        Ok(())
    }

    async fn fulfill_request(
        &self,
        _tab_id: TabId,
        request_id: &str,
        fulfillment: Fulfillment,
    ) -> Result<(), HostError> {
        self.resolved
            .lock()
            .unwrap()
            .push((request_id.to_string(), Some(fulfillment)));
        Ok(())
    }

    async fn is_tab_alive(&self, _tab_id: TabId) -> bool {
        true
    }
}

struct StubTabs;

#[async_trait]
impl TabDirectory for StubTabs {
    async fn tabs(&self) -> Vec<TabInfo> {
        vec![TabInfo {
            tab_id: 1,
            url: Some("https://x.com/".to_string()),
            attached: false,
        }]
    }

    async fn open_tab(&self, url: &str) -> AgentResult<TabId> {
        match url.starts_with("https://") {
            true => Ok(2),
            false => Err(AgentError::Browser(format!("cannot open {}", url))),
        }
    }
}

struct TestApp {
    app: Router,
    host: Arc<StubHost>,
    handle: ControllerHandle,
    editors: Arc<QueuedEditorLauncher>,
    log: Arc<RwLock<RequestLog>>,
}

fn test_app() -> TestApp {
    let host = Arc::new(StubHost::default());
    let editors = Arc::new(QueuedEditorLauncher::new(10));
    let controller = InterceptController::new(host.clone(), editors.clone(), InterceptConfig::default());
    let (handle, _task) = actor::spawn(controller);
    let log = Arc::new(RwLock::new(RequestLog::new(CaptureConfig::default())));

    let state = AppState {
        controller: handle.clone(),
        tabs: Arc::new(StubTabs),
        editors: editors.clone(),
        log: log.clone(),
        replayer: Arc::new(Replayer::new(Duration::from_secs(5)).unwrap()),
    };

    TestApp {
        app: router(state),
        host,
        handle,
        editors,
        log,
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn enable(app: &Router, tab_id: TabId) {
    let (_, body) = call(
        app,
        Method::POST,
        "/messages",
        Some(json!({"type": "ENABLE_INTERCEPTION", "tabId": tab_id, "urlPatterns": ["*/api/*"]})),
    )
    .await;
    assert_eq!(body["success"], true);
}

async fn pause(handle: &ControllerHandle, tab_id: TabId, request_id: &str) {
    let event = RequestPausedEvent::new(tab_id, request_id, "https://x.com/api/users")
        .with_status(Some(200))
        .with_headers(vec![HeaderEntry::new("Content-Type", "application/json")]);
    handle.notify(HostEvent::RequestPaused(event)).await.unwrap();
    // Commands are processed in order; this waits for the pause to settle
    handle.pending().await.unwrap();
}

#[tokio::test]
async fn test_health() {
    let t = test_app();
    let (status, body) = call(&t.app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pendingInterceptions"], 0);
}

#[tokio::test]
async fn test_control_messages() {
    let t = test_app();
    enable(&t.app, 1).await;

    let (_, body) = call(
        &t.app,
        Method::POST,
        "/messages",
        Some(json!({"type": "GET_STATUS", "tabId": 1})),
    )
    .await;
    assert_eq!(body["enabled"], true);
    assert_eq!(body["attachedDebugger"], true);

    let (_, body) = call(
        &t.app,
        Method::POST,
        "/messages",
        Some(json!({"type": "ENABLE_INTERCEPTION", "tabId": 1, "urlPatterns": ["*"]})),
    )
    .await;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "already_enabled");
}

#[tokio::test]
async fn test_malformed_message_gets_structured_reply() {
    let t = test_app();
    let (status, body) = call(
        &t.app,
        Method::POST,
        "/messages",
        Some(json!({"type": "SELF_DESTRUCT", "tabId": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_edit_round_trip() {
    let t = test_app();
    enable(&t.app, 1).await;
    pause(&t.handle, 1, "r1").await;

    let (_, editors) = call(&t.app, Method::GET, "/editors", None).await;
    assert_eq!(editors.as_array().unwrap().len(), 1);

    let (status, editor) = call(&t.app, Method::GET, "/editors/1/r1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(editor["message"]["type"], "LOAD_DATA");
    assert_eq!(editor["message"]["bodyText"], r#"{"ok":true}"#);

    let (_, body) = call(
        &t.app,
        Method::POST,
        "/messages",
        Some(json!({
            "type": "SUBMIT_EDIT",
            "tabId": 1,
            "requestId": "r1",
            "status": "201",
            "body": "{\"ok\":false}"
        })),
    )
    .await;
    assert_eq!(body["success"], true);

    assert!(t.editors.is_empty());
    let resolved = t.host.resolved.lock().unwrap().clone();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].1.as_ref().map(|f| f.status), Some(201));
}

#[tokio::test]
async fn test_closing_editor_passes_response_through() {
    let t = test_app();
    enable(&t.app, 1).await;
    pause(&t.handle, 1, "r1").await;

    let (_, body) = call(&t.app, Method::DELETE, "/editors/1/r1", None).await;
    assert_eq!(body["success"], true);
    assert_eq!(t.host.resolved.lock().unwrap().clone(), vec![("r1".to_string(), None)]);

    let (status, _) = call(&t.app, Method::GET, "/editors/1/r1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call(&t.app, Method::DELETE, "/editors/1/r1", None).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_tabs() {
    let t = test_app();
    enable(&t.app, 1).await;

    let (_, body) = call(&t.app, Method::GET, "/tabs", None).await;
    assert_eq!(body["tabs"][0]["tabId"], 1);
    assert_eq!(body["intercepting"], json!([1]));

    let (_, body) = call(&t.app, Method::POST, "/tabs", Some(json!({"url": "https://x.com/"}))).await;
    assert_eq!(body["tabId"], 2);

    let (status, body) = call(&t.app, Method::POST, "/tabs", Some(json!({"url": "file:///etc"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_request_log_routes() {
    let t = test_app();
    {
        let mut log = t.log.write().await;
        log.record_request(CapturedRequest::new("1:a", Some(1), "https://x.com/api/a", "GET"));
        log.record_request(CapturedRequest::new("2:b", Some(2), "https://x.com/api/b", "POST"));
    }

    let (_, body) = call(&t.app, Method::GET, "/requests?tabId=2", None).await;
    assert_eq!(body["totalCount"], 1);
    assert_eq!(body["requests"][0]["method"], "POST");

    let (_, body) = call(&t.app, Method::DELETE, "/requests", None).await;
    assert_eq!(body["success"], true);
    assert!(t.log.read().await.is_empty());
}

#[tokio::test]
async fn test_replay_unknown_capture() {
    let t = test_app();
    let (status, body) = call(&t.app, Method::POST, "/replay", Some(json!({"captureId": "9:z"}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}
