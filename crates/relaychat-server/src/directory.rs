use relaychat_proto::chat::v1 as pb;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Process-wide map from session identity to that session's delivery channel.
///
/// Constructed once and handed to every collaborator as an `Arc`, so tests can
/// run isolated directories side by side. A single mutex guards the map; it is
/// held only to copy the entry list, never across a send.
pub struct SessionDirectory {
    sessions: Mutex<HashMap<String, mpsc::Sender<pb::Envelope>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a live session's delivery channel. Returns false when the
    /// identity already has a live entry; the first session keeps its slot.
    pub fn register(&self, identity: &str, sender: mpsc::Sender<pb::Envelope>) -> bool {
        let mut sessions = self.sessions.lock().expect("directory lock poisoned");
        if sessions.contains_key(identity) {
            return false;
        }
        sessions.insert(identity.to_string(), sender);
        true
    }

    /// Drop the entry for `identity`, closing its delivery channel once the
    /// receiver drains. Idempotent.
    pub fn remove(&self, identity: &str) -> bool {
        let mut sessions = self.sessions.lock().expect("directory lock poisoned");
        sessions.remove(identity).is_some()
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        let sessions = self.sessions.lock().expect("directory lock poisoned");
        sessions.contains_key(identity)
    }

    /// Consistent point-in-time copy of the live entries.
    pub fn snapshot(&self) -> Vec<(String, mpsc::Sender<pb::Envelope>)> {
        let sessions = self.sessions.lock().expect("directory lock poisoned");
        sessions
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect()
    }

    /// Deliver `envelope` to every registered session except `exclude`.
    ///
    /// Enqueue is non-blocking: a full delivery channel drops the envelope for
    /// that recipient so one slow consumer can never stall the broadcaster.
    pub fn broadcast(&self, envelope: pb::Envelope, exclude: &str) {
        for (identity, tx) in self.snapshot() {
            if identity == exclude {
                continue;
            }
            match tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(identity = %identity, envelope_id = %envelope.id,
                        "delivery channel full, dropping envelope");
                }
                Err(TrySendError::Closed(_)) => {
                    // Session is tearing down; its entry goes away shortly.
                    tracing::debug!(identity = %identity, "delivery channel closed");
                }
            }
        }
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}
