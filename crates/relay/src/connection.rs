//! Per-connection state machine
//!
//! `Connecting -> Active -> Disconnected`. A handler is created for every transport
//! connection; it validates the handshake, dispatches inbound events to the relay
//! and guarantees registry cleanup when the transport goes away, including when the
//! owning task is cancelled and the handler is simply dropped.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::models::{Handshake, Identity, InboundEvent, OutboundEvent, SendMessage};
use crate::presence::SessionId;
use crate::relay::{Delivery, Relay};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active { identity: Identity, session: SessionId },
    Disconnected,
}

pub struct ConnectionHandler {
    relay: Arc<Relay>,
    outbox: mpsc::Sender<OutboundEvent>,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(relay: Arc<Relay>, outbox: mpsc::Sender<OutboundEvent>) -> Self {
        Self {
            relay,
            outbox,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            ConnectionState::Active { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Validate the handshake and, on success, join the presence list.
    ///
    /// A missing `userID` gets a freshly issued one, reported back in the
    /// `session` event. On failure the handler is left `Disconnected` and never
    /// touches the registry.
    pub fn handshake(&mut self, handshake: Handshake) -> Result<Identity> {
        if self.state != ConnectionState::Connecting {
            return Err(RelayError::InvalidHandshake(
                "Handshake already completed".to_string(),
            ));
        }

        let username = match handshake.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                self.state = ConnectionState::Disconnected;
                return Err(RelayError::InvalidHandshake(
                    "Invalid username".to_string(),
                ));
            }
        };

        let connection_id = match handshake.connection_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                let issued = Uuid::new_v4().to_string();
                debug!("[Connection] No userID supplied, issued {}", issued);
                issued
            }
        };

        let identity = Identity::new(username, connection_id);
        if self
            .outbox
            .try_send(OutboundEvent::Session(identity.clone()))
            .is_err()
        {
            warn!(
                "[Connection] Could not confirm session to {}",
                identity.connection_id
            );
        }

        let session = self.relay.register(identity.clone(), self.outbox.clone());
        self.state = ConnectionState::Active {
            identity: identity.clone(),
            session,
        };
        Ok(identity)
    }

    /// Dispatch one inbound event.
    pub async fn handle(&mut self, event: InboundEvent) -> Result<()> {
        let from = self
            .identity()
            .map(|identity| identity.connection_id.clone())
            .ok_or(RelayError::NotActive)?;

        match event {
            InboundEvent::SendMessage(payload) => self.send_message(&from, payload).await,
            InboundEvent::FetchHistory(request) => {
                let receiver = non_empty(request.receiver, "receiver")?;
                let messages = self.relay.fetch_history(&from, &receiver).await?;
                self.reply(OutboundEvent::HistoryResult { messages }).await;
                Ok(())
            }
        }
    }

    async fn send_message(&self, from: &str, payload: SendMessage) -> Result<()> {
        let payload = SendMessage {
            to: non_empty(payload.to, "to")?,
            ..payload
        };
        let to = payload.to.clone();

        match self.relay.send_message(from, payload).await? {
            Delivery::Delivered(count) => {
                debug!("[Connection] {} -> {} delivered to {} connection(s)", from, to, count)
            }
            Delivery::RecipientUnreachable => {
                debug!("[Connection] {} -> {} stored, recipient offline", from, to)
            }
        }
        Ok(())
    }

    /// Parse and dispatch a raw text frame. Failures are logged and reported to
    /// this connection as an `error` event; the connection stays open.
    pub async fn handle_text(&mut self, text: &str) {
        let result = match serde_json::from_str::<InboundEvent>(text) {
            Ok(event) => self.handle(event).await,
            Err(e) => Err(RelayError::from(e)),
        };

        if let Err(e) = result {
            match &e {
                RelayError::Store(_) => error!("[Connection] Event failed: {}", e),
                _ => warn!("[Connection] Rejected event: {}", e),
            }
            self.reply(OutboundEvent::Error {
                message: e.to_string(),
            })
            .await;
        }
    }

    /// Reply to this connection only.
    async fn reply(&self, event: OutboundEvent) {
        if self.outbox.send(event).await.is_err() {
            debug!("[Connection] Outbox closed, reply dropped");
        }
    }

    /// Leave the presence list. Idempotent.
    pub fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        if let ConnectionState::Active { identity, session } = previous {
            self.relay.unregister(session);
            info!("[Connection] {} closed", identity.connection_id);
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn non_empty(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        Err(RelayError::BadRequest(format!("`{}` must not be empty", field)))
    } else {
        Ok(value)
    }
}
