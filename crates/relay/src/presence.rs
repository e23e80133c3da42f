//! Presence registry
//!
//! Ordered list of connected identities together with the outbound handle of each
//! connection. The registry does no locking of its own; [`crate::relay::Relay`]
//! keeps it behind a mutex.

use tokio::sync::mpsc;

use crate::models::{Identity, OutboundEvent};

/// Per-connection id assigned by the relay. Unlike connection ids it is always unique.
pub type SessionId = u64;

/// Where to push events for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub session: SessionId,
    pub outbox: mpsc::Sender<OutboundEvent>,
}

impl ConnectionHandle {
    pub fn new(session: SessionId, outbox: mpsc::Sender<OutboundEvent>) -> Self {
        Self { session, outbox }
    }
}

#[derive(Debug, Clone)]
struct PresenceEntry {
    identity: Identity,
    handle: ConnectionHandle,
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: Vec<PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection. Duplicate connection ids are kept side by side.
    pub fn add(&mut self, identity: Identity, handle: ConnectionHandle) {
        self.entries.push(PresenceEntry { identity, handle });
    }

    /// Remove every entry with `connection_id`. Returns how many were removed.
    pub fn remove(&mut self, connection_id: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.identity.connection_id != connection_id);
        before - self.entries.len()
    }

    /// Remove the single entry owned by `session`.
    pub fn remove_session(&mut self, session: SessionId) -> Option<Identity> {
        let idx = self
            .entries
            .iter()
            .position(|entry| entry.handle.session == session)?;
        Some(self.entries.remove(idx).identity)
    }

    pub fn snapshot(&self) -> Vec<Identity> {
        self.entries
            .iter()
            .map(|entry| entry.identity.clone())
            .collect()
    }

    pub fn handles_for<'a>(
        &'a self,
        connection_id: &'a str,
    ) -> impl Iterator<Item = &'a ConnectionHandle> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.identity.connection_id == connection_id)
            .map(|entry| &entry.handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.entries.iter().map(|entry| &entry.handle)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.handles_for(connection_id).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
