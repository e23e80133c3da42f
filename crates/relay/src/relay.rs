//! Relay core
//!
//! Owns the presence registry and the message store for the life of the process,
//! and provides the push primitives connection handlers use. Registry changes and
//! the broadcasts they trigger happen under one lock acquisition, so every
//! connection sees presence lists in the same order.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::conversation::ConversationKey;
use crate::error::Result;
use crate::models::{DeliveredMessage, Identity, Message, OutboundEvent, SendMessage};
use crate::presence::{ConnectionHandle, PresenceRegistry, SessionId};
use crate::store::MessageStore;

/// Outcome of routing a direct message after it was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed to this many live connections.
    Delivered(usize),
    /// Nobody with the recipient id is connected. The message is still stored.
    RecipientUnreachable,
}

pub struct Relay {
    presence: Mutex<PresenceRegistry>,
    store: Arc<dyn MessageStore>,
    next_session: AtomicU64,
}

impl Relay {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            presence: Mutex::new(PresenceRegistry::new()),
            store,
            next_session: AtomicU64::new(1),
        }
    }

    /// Admit a connection and broadcast the new presence list to everyone,
    /// the newcomer included.
    pub fn register(&self, identity: Identity, outbox: mpsc::Sender<OutboundEvent>) -> SessionId {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let mut presence = self.presence.lock();

        info!(
            "[Relay] {} connected as {} (session {})",
            identity.connection_id, identity.username, session
        );
        presence.add(identity, ConnectionHandle::new(session, outbox));

        let users = presence.snapshot();
        Self::broadcast_locked(&presence, OutboundEvent::PresenceUpdate { users });
        session
    }

    /// Drop one connection, then broadcast the presence list and a departure notice.
    /// Unknown sessions are ignored.
    pub fn unregister(&self, session: SessionId) -> Option<Identity> {
        let mut presence = self.presence.lock();
        let identity = presence.remove_session(session)?;

        info!(
            "[Relay] {} disconnected (session {})",
            identity.connection_id, session
        );

        let users = presence.snapshot();
        Self::broadcast_locked(&presence, OutboundEvent::PresenceUpdate { users });
        Self::broadcast_locked(
            &presence,
            OutboundEvent::UserDeparted(identity.connection_id.clone()),
        );
        Some(identity)
    }

    pub fn presence(&self) -> Vec<Identity> {
        self.presence.lock().snapshot()
    }

    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.presence.lock().contains(connection_id)
    }

    /// Best-effort push to every connection registered under `connection_id`.
    /// Returns how many accepted the event.
    pub fn push_to(&self, connection_id: &str, event: OutboundEvent) -> usize {
        let presence = self.presence.lock();
        presence
            .handles_for(connection_id)
            .filter(|handle| Self::try_push(handle, event.clone()))
            .count()
    }

    pub fn broadcast(&self, event: OutboundEvent) {
        let presence = self.presence.lock();
        Self::broadcast_locked(&presence, event);
    }

    fn broadcast_locked(presence: &PresenceRegistry, event: OutboundEvent) {
        for handle in presence.handles() {
            Self::try_push(handle, event.clone());
        }
    }

    fn try_push(handle: &ConnectionHandle, event: OutboundEvent) -> bool {
        let name = event.name();
        match handle.outbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "[Relay] Outbox full for session {}, dropping {}",
                    handle.session, name
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "[Relay] Session {} already closed, dropping {}",
                    handle.session, name
                );
                false
            }
        }
    }

    /// Persist a direct message from `from`, then push it to the recipient if present.
    pub async fn send_message(&self, from: &str, payload: SendMessage) -> Result<Delivery> {
        let key = ConversationKey::derive(from, &payload.to);
        let delivered = DeliveredMessage::new(from, payload);

        self.store.append(&key, Message::from(&delivered)).await?;

        let to = delivered.to.clone();
        let pushed = self.push_to(&to, OutboundEvent::MessageDelivered(delivered));
        let delivery = if pushed > 0 {
            Delivery::Delivered(pushed)
        } else {
            Delivery::RecipientUnreachable
        };

        debug!("[Relay] {} -> {} stored under {} ({:?})", from, to, key, delivery);
        Ok(delivery)
    }

    /// History of the conversation between `requester` and `receiver`,
    /// creating an empty conversation on first touch.
    pub async fn fetch_history(&self, requester: &str, receiver: &str) -> Result<Vec<Message>> {
        let key = ConversationKey::derive(requester, receiver);
        let messages = self.store.get_or_create(&key).await?;
        debug!(
            "[Relay] {} fetched {} messages from {}",
            requester,
            messages.len(),
            key
        );
        Ok(messages)
    }
}
