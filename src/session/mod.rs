//! Session management
//!
//! Sessions bind a conversation to a fixed working directory and accumulate
//! the messages the conversation engine produced. They live in memory only and
//! are lost when the process exits.

use crate::engine::EngineMessage;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// A conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Repository reference the session was created from, as given
    pub repo_context: Option<String>,
    working_directory: PathBuf,
    pub messages: Vec<EngineMessage>,
    pub metadata: SessionMetadata,
    /// Insertion position in the store
    #[serde(skip)]
    sequence: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub total_prompts: u64,
    pub last_prompt: Option<String>,
}

impl Session {
    fn new(working_directory: PathBuf, repo_context: Option<String>, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            repo_context,
            working_directory,
            messages: Vec::new(),
            metadata: SessionMetadata::default(),
            sequence,
        }
    }

    /// Directory the session is bound to; fixed at creation
    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Most recent conversation id reported by the engine, if any.
    ///
    /// Used to resume the engine's own conversation on a continued prompt.
    pub fn engine_session_id(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(EngineMessage::session_id)
    }
}

/// In-memory session store
///
/// Each operation is atomic on its own; a lookup followed by an update is not.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    next_sequence: Arc<AtomicU64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and insert a fresh session
    pub fn create(&self, working_directory: PathBuf, repo_context: Option<String>) -> Session {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(working_directory, repo_context, sequence);
        debug!(
            session_id = %session.id,
            directory = %session.working_directory.display(),
            "Session created"
        );
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Snapshot of a session
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Append messages and count one more prompt.
    ///
    /// Returns `false` (and logs) if the session was deleted in the meantime.
    pub fn append_and_touch(&self, id: &str, messages: Vec<EngineMessage>, prompt: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                let session = entry.value_mut();
                session.messages.extend(messages);
                session.metadata.total_prompts += 1;
                session.metadata.last_prompt = Some(prompt.to_string());
                session.updated_at = Utc::now();
                true
            }
            None => {
                warn!(session_id = %id, "Session vanished before results could be recorded");
                false
            }
        }
    }

    /// Remove a session. The working directory is left untouched.
    pub fn delete(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Snapshot of every session, oldest first
    pub fn list_all(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.sequence);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(kind: &str, extra: serde_json::Value) -> EngineMessage {
        let mut value = extra;
        value["type"] = json!(kind);
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn fresh_session_is_empty() {
        let store = SessionStore::new();
        let session = store.create(PathBuf::from("/repos/app"), Some("app".into()));

        let fetched = store.get(&session.id).unwrap();
        assert!(fetched.messages.is_empty());
        assert_eq!(fetched.metadata.total_prompts, 0);
        assert_eq!(fetched.working_directory(), Path::new("/repos/app"));
        assert_eq!(fetched.repo_context.as_deref(), Some("app"));
    }

    #[test]
    fn ids_are_unique() {
        let store = SessionStore::new();
        let a = store.create(PathBuf::from("/a"), None);
        let b = store.create(PathBuf::from("/a"), None);
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn append_accumulates_in_order() {
        let store = SessionStore::new();
        let session = store.create(PathBuf::from("/a"), None);

        assert!(store.append_and_touch(
            &session.id,
            vec![message("assistant", json!({"n": 1}))],
            "first"
        ));
        assert!(store.append_and_touch(
            &session.id,
            vec![
                message("assistant", json!({"n": 2})),
                message("result", json!({"n": 3}))
            ],
            "second"
        ));

        let updated = store.get(&session.id).unwrap();
        assert_eq!(updated.metadata.total_prompts, 2);
        assert_eq!(updated.metadata.last_prompt.as_deref(), Some("second"));
        let order: Vec<_> = updated.messages.iter().map(|m| m.body["n"].clone()).collect();
        assert_eq!(order, vec![json!(1), json!(2), json!(3)]);
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn append_to_deleted_session_is_a_no_op() {
        let store = SessionStore::new();
        let session = store.create(PathBuf::from("/a"), None);
        assert!(store.delete(&session.id));
        assert!(!store.append_and_touch(&session.id, Vec::new(), "late"));
        assert!(store.get(&session.id).is_none());
    }

    #[test]
    fn double_delete_returns_false() {
        let store = SessionStore::new();
        let session = store.create(PathBuf::from("/a"), None);
        assert!(store.delete(&session.id));
        assert!(!store.delete(&session.id));
    }

    #[test]
    fn list_is_a_snapshot_in_creation_order() {
        let store = SessionStore::new();
        let first = store.create(PathBuf::from("/a"), None);
        let second = store.create(PathBuf::from("/b"), None);
        let listed = store.list_all();
        store.delete(&first.id);

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
        assert_eq!(store.list_all().len(), 1);
    }

    #[test]
    fn engine_session_id_is_the_latest_reported() {
        let store = SessionStore::new();
        let session = store.create(PathBuf::from("/a"), None);
        store.append_and_touch(
            &session.id,
            vec![
                message("system", json!({"session_id": "old"})),
                message("result", json!({"session_id": "new"})),
            ],
            "p",
        );
        let session = store.get(&session.id).unwrap();
        assert_eq!(session.engine_session_id(), Some("new"));
    }
}
