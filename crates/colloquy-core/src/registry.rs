//! Process-wide registry of live conversation sessions.
//!
//! Replaces connection-keyed global state: the server owns one
//! `SessionRegistry` and passes it by reference to whatever needs to look
//! up a session or notify the clients attached to it. Each session has
//! its own notification channel and turn gate; nothing is shared between
//! sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ColloquyError, Result};
use crate::types::Session;

/// Shared handle to one session's data. Hold it only for short, await-free
/// sections.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Serializes the turns of one session. The driver holds it for a whole
/// turn, provider call included.
pub type TurnGate = Arc<tokio::sync::Mutex<()>>;

struct SessionEntry {
    session: SessionHandle,
    turn_gate: TurnGate,
    events: broadcast::Sender<serde_json::Value>,
}

/// Registry of active sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
    event_capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionRegistry {
    /// Create an empty registry. Each session's notification channel
    /// buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            event_capacity: capacity.max(1),
        }
    }

    /// Create and register a fresh session.
    pub fn create(&self) -> Result<(Uuid, SessionHandle)> {
        let session = Session::new();
        let id = session.id;
        let handle = self.insert(session)?;
        Ok((id, handle))
    }

    /// Register an existing session, replacing any session with the same id.
    pub fn insert(&self, session: Session) -> Result<SessionHandle> {
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        let (events, _) = broadcast::channel(self.event_capacity);
        let entry = SessionEntry {
            session: Arc::clone(&handle),
            turn_gate: Arc::new(tokio::sync::Mutex::new(())),
            events,
        };
        self.lock()?.insert(id, entry);
        debug!(session_id = %id, "Session registered");
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Result<SessionHandle> {
        self.with_entry(id, |entry| Arc::clone(&entry.session))
    }

    /// The turn gate of session `id`.
    pub fn turn_gate(&self, id: Uuid) -> Result<TurnGate> {
        self.with_entry(id, |entry| Arc::clone(&entry.turn_gate))
    }

    /// Drop a session from the registry. Returns whether it was present.
    pub fn remove(&self, id: Uuid) -> Result<bool> {
        let removed = self.lock()?.remove(&id).is_some();
        if removed {
            debug!(session_id = %id, "Session removed");
        }
        Ok(removed)
    }

    /// Reset a session to an empty conversation, keeping its id and handle.
    pub fn clear(&self, id: Uuid) -> Result<()> {
        let handle = self.get(id)?;
        let mut session = handle
            .lock()
            .map_err(|e| ColloquyError::LockPoisoned(e.to_string()))?;
        session.clear();
        debug!(session_id = %id, "Session cleared");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.lock()?.keys().copied().collect())
    }

    /// Subscribe to the notifications of session `id`.
    pub fn subscribe(&self, id: Uuid) -> Result<broadcast::Receiver<serde_json::Value>> {
        self.with_entry(id, |entry| entry.events.subscribe())
    }

    /// Notify the clients of session `id`. Returns the number of receivers
    /// reached; zero when nobody is listening.
    pub fn broadcast(&self, id: Uuid, event: serde_json::Value) -> Result<usize> {
        self.with_entry(id, |entry| entry.events.send(event).unwrap_or(0))
    }

    fn with_entry<T>(&self, id: Uuid, f: impl FnOnce(&SessionEntry) -> T) -> Result<T> {
        self.lock()?
            .get(&id)
            .map(f)
            .ok_or(ColloquyError::SessionNotFound(id))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, SessionEntry>>> {
        self.sessions
            .lock()
            .map_err(|e| ColloquyError::LockPoisoned(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::default();
        let (id, handle) = registry.create().unwrap();

        handle.lock().unwrap().push_message(Message::user("hello"));

        let fetched = registry.get(id).unwrap();
        assert_eq!(fetched.lock().unwrap().messages.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing_session() {
        let registry = SessionRegistry::default();
        let id = Uuid::new_v4();
        let err = registry.get(id).unwrap_err();
        assert!(matches!(err, ColloquyError::SessionNotFound(missing) if missing == id));
    }

    #[test]
    fn test_clear_keeps_session_registered() {
        let registry = SessionRegistry::default();
        let (id, handle) = registry.create().unwrap();
        {
            let mut session = handle.lock().unwrap();
            session.push_message(Message::user("hi"));
            session.set_stop_retrying(true);
        }

        registry.clear(id).unwrap();

        let session = handle.lock().unwrap();
        assert!(session.messages.is_empty());
        assert!(!session.stop_retrying());
        assert_eq!(session.id, id);
        drop(session);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_missing_session() {
        let registry = SessionRegistry::default();
        assert!(registry.clear(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_remove_session() {
        let registry = SessionRegistry::default();
        let (id, _) = registry.create().unwrap();
        assert!(registry.remove(id).unwrap());
        assert!(!registry.remove(id).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let registry = SessionRegistry::default();
        let (a, handle_a) = registry.create().unwrap();
        let (b, _) = registry.create().unwrap();

        handle_a.lock().unwrap().set_stop_retrying(true);

        assert!(registry.get(a).unwrap().lock().unwrap().stop_retrying());
        assert!(!registry.get(b).unwrap().lock().unwrap().stop_retrying());

        let mut ids = registry.ids().unwrap();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    // ---- Notifications ----

    #[test]
    fn test_broadcast_without_subscribers() {
        let registry = SessionRegistry::default();
        let (id, _) = registry.create().unwrap();
        let reached = registry.broadcast(id, serde_json::json!({"type": "ping"}));
        assert_eq!(reached.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let registry = SessionRegistry::new(8);
        let (id, _) = registry.create().unwrap();
        let mut rx = registry.subscribe(id).unwrap();

        let reached = registry.broadcast(id, serde_json::json!({"type": "fragment"}));
        assert_eq!(reached.unwrap(), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event["type"], "fragment");
    }

    #[test]
    fn test_broadcast_stays_within_session() {
        let registry = SessionRegistry::default();
        let (a, _) = registry.create().unwrap();
        let (b, _) = registry.create().unwrap();
        let mut rx_a = registry.subscribe(a).unwrap();
        let mut rx_b = registry.subscribe(b).unwrap();

        assert_eq!(registry.broadcast(a, serde_json::json!({"n": 1})).unwrap(), 1);

        assert_eq!(rx_a.try_recv().unwrap()["n"], 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_notifications_for_missing_session() {
        let registry = SessionRegistry::default();
        let id = Uuid::new_v4();
        assert!(matches!(
            registry.subscribe(id),
            Err(ColloquyError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.broadcast(id, serde_json::json!({})),
            Err(ColloquyError::SessionNotFound(_))
        ));
    }

    // ---- Turn gates ----

    #[tokio::test]
    async fn test_turn_gate_is_shared_per_session() {
        let registry = SessionRegistry::default();
        let (a, _) = registry.create().unwrap();
        let (b, _) = registry.create().unwrap();

        let gate_a = registry.turn_gate(a).unwrap();
        assert!(Arc::ptr_eq(&gate_a, &registry.turn_gate(a).unwrap()));

        let _held = gate_a.lock().await;
        assert!(registry.turn_gate(a).unwrap().try_lock().is_err());
        assert!(registry.turn_gate(b).unwrap().try_lock().is_ok());
    }
}
