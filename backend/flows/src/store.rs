//! In-memory LocalSession store.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;

use verilink_core::{LocalSession, SessionKey};

/// A LocalSession behind its own lock, so one caller at a time drives its
/// state transitions.
pub type SessionCell = Arc<Mutex<LocalSession>>;

#[derive(Clone, Default)]
pub struct LocalSessionStore {
    sessions: Arc<DashMap<SessionKey, SessionCell>>,
}

impl LocalSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<SessionCell> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert `session` and run `on_insert` while the key's shard is still
    /// locked, so no other insert for the key can interleave.
    pub fn install<F>(&self, session: LocalSession, on_insert: F) -> Option<SessionCell>
    where
        F: FnOnce(&SessionKey),
    {
        let key = session.key.clone();
        let cell = Arc::new(Mutex::new(session));
        match self.sessions.entry(key) {
            Entry::Occupied(mut occupied) => {
                on_insert(occupied.key());
                Some(occupied.insert(cell))
            }
            Entry::Vacant(vacant) => {
                on_insert(vacant.key());
                vacant.insert(cell);
                None
            }
        }
    }

    /// Whether `key` still maps to `cell`.
    pub fn is_current(&self, key: &str, cell: &SessionCell) -> bool {
        self.sessions
            .get(key)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), cell))
    }

    pub fn remove(&self, key: &str) -> Option<SessionCell> {
        self.sessions.remove(key).map(|(_, cell)| cell)
    }

    /// Remove `key` only while it still maps to `cell`. Returns whether it did.
    pub fn remove_if_same(&self, key: &str, cell: &SessionCell) -> bool {
        self.sessions
            .remove_if(key, |_, current| Arc::ptr_eq(current, cell))
            .is_some()
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Keys of sessions accepted longer than `max_age` ago. Sessions whose
    /// lock is held are skipped.
    pub fn expired_keys(&self, max_age: Duration) -> Vec<SessionKey> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                let session = entry.value().try_lock().ok()?;
                (session.elapsed() > max_age).then(|| entry.key().clone())
            })
            .collect()
    }
}
