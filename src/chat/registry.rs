// Registry of connected sessions and broadcast fan-out

use crate::chat::session::{Admission, Session};
use crate::chat::transport::{Connection, ConnectionId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// All sessions the server currently knows about.
///
/// Connect and disconnect hooks run on different connection tasks while
/// broadcasts iterate the map, so every access goes through one lock.
/// The lock is never held across an await.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    sessions: Mutex<HashMap<ConnectionId, Session>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly connected, unauthenticated peer
    pub fn insert(&self, connection: Connection) {
        let session = Session::new(connection);
        self.sessions().insert(session.id(), session);
    }

    /// Unregister a peer, returning its session
    pub fn remove(&self, id: ConnectionId) -> Option<Session> {
        self.sessions().remove(&id)
    }

    /// Run an inbound line through the sender's session.
    ///
    /// `None` if the connection is unknown or its session already closed.
    pub fn admit(&self, id: ConnectionId, line: &str) -> Option<Admission> {
        self.sessions().get_mut(&id)?.admit(line)
    }

    /// Login id of a registered peer, if it logged in
    pub fn login_id(&self, id: ConnectionId) -> Option<String> {
        self.sessions()
            .get(&id)
            .and_then(|session| session.login_id().map(str::to_string))
    }

    /// Send a line to every session that is not closed.
    ///
    /// Delivery is best effort per recipient: a failed send is logged and
    /// the rest still receive the line. Returns the number of recipients
    /// the line was queued for.
    pub fn broadcast(&self, line: &str) -> usize {
        let sessions = self.sessions();
        let mut delivered = 0;

        for (id, session) in sessions.iter() {
            if session.is_closed() {
                continue;
            }

            match session.connection().send(line) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Failed to send to client {}: {}", id, e),
            }
        }

        delivered
    }

    /// Close every open connection. Sessions stay registered, marked
    /// closed, until their disconnect hook removes them.
    pub fn close_all(&self) -> usize {
        let mut sessions = self.sessions();
        let mut closed = 0;

        for (id, session) in sessions.iter_mut() {
            if session.is_closed() {
                continue;
            }

            session.close();
            match session.connection().close() {
                Ok(()) => closed += 1,
                Err(e) => tracing::debug!("Failed to close client {}: {}", id, e),
            }
        }

        closed
    }

    /// Number of sessions that are not closed
    pub fn connected_count(&self) -> usize {
        self.sessions()
            .values()
            .filter(|session| !session.is_closed())
            .count()
    }

    /// Number of registered sessions, closed ones included
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::error::ProtocolViolation;
    use crate::chat::transport::Outbound;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn register(registry: &ServerRegistry) -> (ConnectionId, UnboundedReceiver<Outbound>) {
        let (connection, rx) = Connection::detached();
        let id = connection.id();
        registry.insert(connection);
        (id, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_broadcast_reaches_every_open_session() {
        let registry = ServerRegistry::new();
        let (alice, mut alice_rx) = register(&registry);
        let (_bob, mut bob_rx) = register(&registry);

        registry.admit(alice, "#login alice");
        let admission = registry.admit(alice, "hi");
        assert_eq!(admission, Some(Admission::Chat("alice: hi".to_string())));

        assert_eq!(registry.broadcast("alice: hi"), 2);
        assert_eq!(drain(&mut alice_rx), vec![Outbound::Line("alice: hi".to_string())]);
        assert_eq!(drain(&mut bob_rx), vec![Outbound::Line("alice: hi".to_string())]);
    }

    #[test]
    fn test_rejected_session_is_left_out_of_broadcasts() {
        let registry = ServerRegistry::new();
        let (raw, mut raw_rx) = register(&registry);
        let (_other, _other_rx) = register(&registry);

        assert_eq!(
            registry.admit(raw, "hello"),
            Some(Admission::Rejected(ProtocolViolation::NotLoggedIn))
        );
        assert_eq!(registry.connected_count(), 1);
        assert_eq!(registry.broadcast("server: hi"), 1);
        assert!(drain(&mut raw_rx).is_empty());
    }

    #[test]
    fn test_failed_recipient_does_not_stop_broadcast() {
        let registry = ServerRegistry::new();
        let (_gone, gone_rx) = register(&registry);
        let (_live, mut live_rx) = register(&registry);

        // The writer for this connection is gone
        drop(gone_rx);

        assert_eq!(registry.broadcast("x: y"), 1);
        assert_eq!(drain(&mut live_rx), vec![Outbound::Line("x: y".to_string())]);
    }

    #[test]
    fn test_close_all_and_remove() {
        let registry = ServerRegistry::new();
        let (a, mut a_rx) = register(&registry);
        let (b, _b_rx) = register(&registry);
        registry.admit(a, "#login a");

        assert_eq!(registry.close_all(), 2);
        assert_eq!(registry.connected_count(), 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(drain(&mut a_rx), vec![Outbound::Close]);

        assert_eq!(registry.remove(a).and_then(|s| s.login_id().map(str::to_string)), Some("a".to_string()));
        assert!(registry.remove(b).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_connection_is_ignored() {
        let registry = ServerRegistry::new();
        let (connection, _rx) = Connection::detached();
        assert_eq!(registry.admit(connection.id(), "#login a"), None);
        assert_eq!(registry.login_id(connection.id()), None);
    }
}
