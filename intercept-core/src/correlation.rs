//! Paused responses keyed by (tab, request)
//!
//! Request ids come from the debugging protocol and are only unique within
//! one attachment, so every lookup goes through the composite key.

use crate::codec::DecodedBody;
use crate::error::{InterceptError, InterceptResult};
use crate::validation::ValidatedEdit;
use chrono::{DateTime, Utc};
use intercept_common::{EditorSnapshot, HeaderEntry, RequestId, TabId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptionKey {
    pub tab_id: TabId,
    pub request_id: RequestId,
}

impl InterceptionKey {
    pub fn new(tab_id: TabId, request_id: impl Into<RequestId>) -> Self {
        Self {
            tab_id,
            request_id: request_id.into(),
        }
    }
}

/// One in-flight response held back from the page
#[derive(Debug, Clone)]
pub struct PausedInterception {
    pub request_id: RequestId,
    pub tab_id: TabId,
    pub url: String,
    pub method: String,
    pub status: u16,
    /// Original response headers, duplicates kept
    pub headers: Vec<HeaderEntry>,
    pub body: DecodedBody,
    pub created_at: DateTime<Utc>,
    /// Replacement accepted from the editor, set while fulfilling
    pub edit: Option<ValidatedEdit>,
}

impl PausedInterception {
    pub fn key(&self) -> InterceptionKey {
        InterceptionKey::new(self.tab_id, self.request_id.clone())
    }

    /// Read-only view sent to the editor in `LOAD_DATA`
    pub fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot {
            request_id: self.request_id.clone(),
            tab_id: self.tab_id,
            url: self.url.clone(),
            method: self.method.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body_text: self.body.text.clone(),
            body_kind: self.body.kind,
            content_encoding: self.body.encoding,
            compressed_unreadable: self.body.is_compressed,
            decode_error: self.body.error.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<InterceptionKey, PausedInterception>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a paused response; an unresolved entry for the same key is
    /// never replaced.
    pub fn put(&mut self, interception: PausedInterception) -> InterceptResult<()> {
        let key = interception.key();
        if self.entries.contains_key(&key) {
            return Err(InterceptError::DuplicateInterception {
                tab_id: key.tab_id,
                request_id: key.request_id,
            });
        }
        self.entries.insert(key, interception);
        Ok(())
    }

    pub fn get(&self, tab_id: TabId, request_id: &str) -> Option<&PausedInterception> {
        self.entries.get(&InterceptionKey::new(tab_id, request_id))
    }

    pub fn get_mut(&mut self, tab_id: TabId, request_id: &str) -> Option<&mut PausedInterception> {
        self.entries.get_mut(&InterceptionKey::new(tab_id, request_id))
    }

    pub fn contains(&self, tab_id: TabId, request_id: &str) -> bool {
        self.get(tab_id, request_id).is_some()
    }

    pub fn remove(&mut self, tab_id: TabId, request_id: &str) -> Option<PausedInterception> {
        self.entries.remove(&InterceptionKey::new(tab_id, request_id))
    }

    /// Drop every entry of a tab, oldest first
    pub fn remove_all_for_tab(&mut self, tab_id: TabId) -> Vec<PausedInterception> {
        let keys = self.keys_for_tab(tab_id);
        let mut removed: Vec<PausedInterception> = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect();
        removed.sort_by_key(|entry| entry.created_at);
        removed
    }

    pub fn count_for_tab(&self, tab_id: TabId) -> usize {
        self.entries.keys().filter(|key| key.tab_id == tab_id).count()
    }

    pub fn keys_for_tab(&self, tab_id: TabId) -> Vec<InterceptionKey> {
        let mut keys: Vec<InterceptionKey> = self
            .entries
            .keys()
            .filter(|key| key.tab_id == tab_id)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn all_keys(&self) -> Vec<InterceptionKey> {
        let mut keys: Vec<InterceptionKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove entries whose tab no longer has a session
    pub fn purge_orphans<F>(&mut self, has_session: F) -> Vec<PausedInterception>
    where
        F: Fn(TabId) -> bool,
    {
        let orphaned: Vec<InterceptionKey> = self
            .entries
            .keys()
            .filter(|key| !has_session(key.tab_id))
            .cloned()
            .collect();

        orphaned
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(tab_id: TabId, request_id: &str) -> PausedInterception {
        PausedInterception {
            request_id: request_id.to_string(),
            tab_id,
            url: format!("https://x.com/api/{}", request_id),
            method: "GET".to_string(),
            status: 200,
            headers: vec![HeaderEntry::new("Content-Type", "application/json")],
            body: DecodedBody::default(),
            created_at: Utc::now(),
            edit: None,
        }
    }

    #[test]
    fn test_same_request_id_on_different_tabs() {
        let mut table = CorrelationTable::new();
        table.put(paused(1, "r1")).unwrap();
        table.put(paused(2, "r1")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "r1").map(|p| p.tab_id), Some(1));
        assert_eq!(table.get(2, "r1").map(|p| p.tab_id), Some(2));

        table.remove(1, "r1");
        assert!(!table.contains(1, "r1"));
        assert!(table.contains(2, "r1"));
    }

    #[test]
    fn test_duplicate_put_is_rejected() {
        let mut table = CorrelationTable::new();
        table.put(paused(7, "r1")).unwrap();

        let mut second = paused(7, "r1");
        second.url = "https://x.com/other".to_string();
        assert!(matches!(
            table.put(second),
            Err(InterceptError::DuplicateInterception { tab_id: 7, .. })
        ));
        assert_eq!(table.get(7, "r1").map(|p| p.url.as_str()), Some("https://x.com/api/r1"));
    }

    #[test]
    fn test_remove_all_for_tab() {
        let mut table = CorrelationTable::new();
        table.put(paused(7, "a")).unwrap();
        table.put(paused(7, "b")).unwrap();
        table.put(paused(8, "a")).unwrap();

        assert_eq!(table.count_for_tab(7), 2);
        assert_eq!(table.remove_all_for_tab(7).len(), 2);
        assert_eq!(table.count_for_tab(7), 0);
        assert_eq!(table.keys_for_tab(8), vec![InterceptionKey::new(8, "a")]);
    }

    #[test]
    fn test_purge_orphans() {
        let mut table = CorrelationTable::new();
        table.put(paused(1, "a")).unwrap();
        table.put(paused(2, "b")).unwrap();

        let purged = table.purge_orphans(|tab_id| tab_id == 1);
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].tab_id, 2);
        assert_eq!(table.all_keys(), vec![InterceptionKey::new(1, "a")]);
    }

    #[test]
    fn test_snapshot_carries_body_flags() {
        let mut entry = paused(3, "r9");
        entry.body.text = "{}".to_string();
        entry.body.is_compressed = true;

        let snapshot = entry.snapshot();
        assert_eq!(snapshot.tab_id, 3);
        assert_eq!(snapshot.body_text, "{}");
        assert!(snapshot.compressed_unreadable);
    }
}
