//! Editor surfaces reached over HTTP
//!
//! The agent cannot open windows itself. Every `LOAD_DATA` message is parked
//! here until an editor surface polls for it, and removed again when the
//! controller closes the surface or the response is resolved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use intercept_common::{EditorMessage, EditorSnapshot, TabId};
use intercept_core::{EditorError, EditorLauncher, InterceptionKey};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// One open editor waiting for, or held by, a surface
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEditor {
    pub id: Uuid,
    pub message: EditorMessage,
    pub opened_at: DateTime<Utc>,
}

impl QueuedEditor {
    pub fn snapshot(&self) -> &EditorSnapshot {
        let EditorMessage::LoadData(snapshot) = &self.message;
        snapshot
    }
}

#[derive(Debug)]
pub struct QueuedEditorLauncher {
    editors: DashMap<InterceptionKey, QueuedEditor>,
    max_open: usize,
}

impl QueuedEditorLauncher {
    pub fn new(max_open: usize) -> Self {
        Self {
            editors: DashMap::new(),
            max_open,
        }
    }

    /// Open editors, oldest first
    pub fn open_editors(&self) -> Vec<QueuedEditor> {
        let mut editors: Vec<QueuedEditor> = self.editors.iter().map(|entry| entry.value().clone()).collect();
        editors.sort_by_key(|editor| editor.opened_at);
        editors
    }

    pub fn get(&self, tab_id: TabId, request_id: &str) -> Option<QueuedEditor> {
        self.editors
            .get(&InterceptionKey::new(tab_id, request_id))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.editors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }
}

#[async_trait]
impl EditorLauncher for QueuedEditorLauncher {
    async fn open(&self, message: EditorMessage) -> Result<(), EditorError> {
        let EditorMessage::LoadData(snapshot) = &message;
        let key = InterceptionKey::new(snapshot.tab_id, snapshot.request_id.clone());

        if !self.editors.contains_key(&key) && self.editors.len() >= self.max_open {
            return Err(EditorError::Launch(format!(
                "too many open editors ({})",
                self.max_open
            )));
        }

        debug!(tab_id = key.tab_id, request_id = %key.request_id, "editor queued");
        self.editors.insert(
            key,
            QueuedEditor {
                id: Uuid::new_v4(),
                message,
                opened_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn close(&self, tab_id: TabId, request_id: &str) {
        if self.editors.remove(&InterceptionKey::new(tab_id, request_id)).is_some() {
            debug!(tab_id, request_id, "editor closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercept_common::{BodyKind, ContentEncoding};

    fn load(tab_id: TabId, request_id: &str) -> EditorMessage {
        EditorMessage::LoadData(EditorSnapshot {
            request_id: request_id.to_string(),
            tab_id,
            url: "https://x.com/api".to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: Vec::new(),
            body_text: "{}".to_string(),
            body_kind: BodyKind::Text,
            content_encoding: ContentEncoding::Identity,
            compressed_unreadable: false,
            decode_error: None,
        })
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let launcher = QueuedEditorLauncher::new(10);
        launcher.open(load(1, "r1")).await.unwrap();
        launcher.open(load(2, "r1")).await.unwrap();

        assert_eq!(launcher.len(), 2);
        assert_eq!(launcher.get(2, "r1").unwrap().snapshot().tab_id, 2);

        launcher.close(1, "r1").await;
        launcher.close(1, "unknown").await;
        assert!(launcher.get(1, "r1").is_none());
        assert_eq!(launcher.open_editors().len(), 1);
    }

    #[tokio::test]
    async fn test_limit_on_open_editors() {
        let launcher = QueuedEditorLauncher::new(1);
        launcher.open(load(1, "r1")).await.unwrap();

        let err = launcher.open(load(1, "r2")).await.unwrap_err();
        assert!(matches!(err, EditorError::Launch(_)));

        // Reopening the same response replaces it
        launcher.open(load(1, "r1")).await.unwrap();
        assert_eq!(launcher.len(), 1);
    }
}
