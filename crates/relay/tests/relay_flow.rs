//! End-to-end flows through connection handlers, the relay, and each store backend.

use relay::config::RelayConfig;
use relay::models::{
    DeliveredMessage, FetchHistory, Handshake, Identity, InboundEvent, Message, OutboundEvent,
    SendMessage,
};
use relay::relay::Relay;
use relay::store::{JsonFileStore, MemoryStore, MessageStore, SqliteStore};
use relay::{ConnectionHandler, ConnectionState, ConversationKey};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

struct Client {
    handler: ConnectionHandler,
    events: mpsc::Receiver<OutboundEvent>,
}

impl Client {
    fn connect(relay: &Arc<Relay>, username: &str, connection_id: &str) -> Self {
        let (tx, events) = mpsc::channel(32);
        let mut handler = ConnectionHandler::new(relay.clone(), tx);
        assert_ok!(handler.handshake(Handshake::new(username, Some(connection_id))));
        Self { handler, events }
    }

    fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    async fn send(&mut self, to: &str, message: &str, time: &str) {
        assert_ok!(
            self.handler
                .handle(InboundEvent::SendMessage(SendMessage {
                    to: to.into(),
                    message: message.into(),
                    time: time.into(),
                }))
                .await
        );
    }

    async fn fetch(&mut self, receiver: &str) -> Vec<Message> {
        self.drain();
        assert_ok!(
            self.handler
                .handle(InboundEvent::FetchHistory(FetchHistory {
                    receiver: receiver.into(),
                }))
                .await
        );
        match self.drain().as_slice() {
            [OutboundEvent::HistoryResult { messages }] => messages.clone(),
            other => panic!("expected a single history result, got {:?}", other),
        }
    }
}

fn relay_with(store: Arc<dyn MessageStore>) -> Arc<Relay> {
    Arc::new(Relay::new(store))
}

#[tokio::test]
async fn test_direct_message_delivered_and_stored() {
    let relay = relay_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&relay, "alice", "a1");
    let mut bob = Client::connect(&relay, "bob", "b1");
    alice.drain();
    bob.drain();

    alice.send("b1", "hi", "T1").await;

    assert_eq!(
        bob.drain(),
        vec![OutboundEvent::MessageDelivered(DeliveredMessage {
            from: "a1".into(),
            to: "b1".into(),
            message: "hi".into(),
            time: "T1".into(),
        })]
    );
    assert!(alice.drain().is_empty());

    let expected = vec![Message::new("a1", "hi", "T1")];
    assert_eq!(alice.fetch("b1").await, expected);
    assert_eq!(bob.fetch("a1").await, expected);
}

#[tokio::test]
async fn test_offline_recipient_reads_history_after_connecting() {
    let relay = relay_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&relay, "alice", "a1");

    alice.send("b1", "are you there?", "T1").await;
    alice.send("b1", "ping", "T2").await;

    let mut bob = Client::connect(&relay, "bob", "b1");
    assert_eq!(
        bob.fetch("a1").await,
        vec![
            Message::new("a1", "are you there?", "T1"),
            Message::new("a1", "ping", "T2"),
        ]
    );
}

#[tokio::test]
async fn test_fetch_untouched_conversation_materializes_it() {
    let store = Arc::new(MemoryStore::new());
    let relay = relay_with(store.clone());
    let mut alice = Client::connect(&relay, "alice", "a1");

    assert!(alice.fetch("nobody").await.is_empty());
    assert_eq!(
        store
            .query(&ConversationKey::derive("nobody", "a1"))
            .await
            .unwrap(),
        Some(vec![])
    );
}

#[tokio::test]
async fn test_presence_and_departure_broadcasts() {
    let relay = relay_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&relay, "alice", "a1");
    alice.drain();

    let mut bob = Client::connect(&relay, "bob", "b1");
    assert_eq!(
        bob.drain(),
        vec![
            OutboundEvent::Session(Identity::new("bob", "b1")),
            OutboundEvent::PresenceUpdate {
                users: vec![Identity::new("alice", "a1"), Identity::new("bob", "b1")],
            },
        ]
    );

    bob.handler.disconnect();
    assert_eq!(bob.handler.state(), &ConnectionState::Disconnected);
    assert_eq!(
        alice.drain(),
        vec![
            OutboundEvent::PresenceUpdate {
                users: vec![Identity::new("alice", "a1"), Identity::new("bob", "b1")],
            },
            OutboundEvent::PresenceUpdate {
                users: vec![Identity::new("alice", "a1")],
            },
            OutboundEvent::UserDeparted("b1".into()),
        ]
    );

    bob.handler.disconnect();
    assert!(alice.drain().is_empty());
    assert_err!(
        bob.handler
            .handle(InboundEvent::FetchHistory(FetchHistory {
                receiver: "a1".into()
            }))
            .await
    );
}

#[tokio::test]
async fn test_duplicate_connection_ids_leave_one_at_a_time() {
    let relay = relay_with(Arc::new(MemoryStore::new()));
    let mut first = Client::connect(&relay, "alice", "a1");
    let mut second = Client::connect(&relay, "alice-phone", "a1");
    let mut bob = Client::connect(&relay, "bob", "b1");
    first.drain();
    second.drain();

    bob.send("a1", "both of you", "T1").await;
    assert_eq!(first.drain().len(), 1);
    assert_eq!(second.drain().len(), 1);

    assert_eq!(relay.presence().len(), 3);
    first.handler.disconnect();
    assert_eq!(
        relay.presence(),
        vec![Identity::new("alice-phone", "a1"), Identity::new("bob", "b1")]
    );
    assert!(relay.is_connected("a1"));

    second.handler.disconnect();
    assert_eq!(relay.presence(), vec![Identity::new("bob", "b1")]);
}

#[tokio::test]
async fn test_dropped_connection_is_cleaned_up() {
    let relay = relay_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&relay, "alice", "a1");
    let bob = Client::connect(&relay, "bob", "b1");
    alice.drain();

    drop(bob);

    assert_eq!(relay.presence(), vec![Identity::new("alice", "a1")]);
    assert_eq!(
        alice.drain().last(),
        Some(&OutboundEvent::UserDeparted("b1".into()))
    );
}

#[tokio::test]
async fn test_json_store_heals_under_live_traffic() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data.json");
    let relay = relay_with(Arc::new(JsonFileStore::open(&path).await.unwrap()));
    let mut alice = Client::connect(&relay, "alice", "a1");
    let mut bob = Client::connect(&relay, "bob", "b1");

    alice.send("b1", "before", "T1").await;
    std::fs::write(&path, "{ corrupted").unwrap();
    alice.send("b1", "after", "T2").await;

    assert_eq!(bob.fetch("a1").await, vec![Message::new("a1", "after", "T2")]);
}

#[tokio::test]
async fn test_history_survives_restart_with_configured_backends() {
    for backend in ["json", "sqlite"] {
        let temp_dir = TempDir::new().unwrap();
        let config = RelayConfig {
            store: backend.parse().unwrap(),
            data_path: temp_dir.path().join(format!("store.{}", backend)),
            ..RelayConfig::default()
        };

        {
            let relay = relay_with(config.open_store().await.unwrap());
            let mut alice = Client::connect(&relay, "alice", "a1");
            alice.send("b1", "persisted", "T1").await;
        }

        let relay = relay_with(config.open_store().await.unwrap());
        let mut bob = Client::connect(&relay, "bob", "b1");
        assert_eq!(
            bob.fetch("a1").await,
            vec![Message::new("a1", "persisted", "T1")],
            "backend {}",
            backend
        );
    }
}

#[tokio::test]
async fn test_concurrent_senders_keep_every_message() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(
        SqliteStore::open(temp_dir.path().join("relay.sqlite"))
            .await
            .unwrap(),
    );
    let relay = relay_with(store.clone());

    let mut tasks = Vec::new();
    for sender in ["a1", "c1", "d1"] {
        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(&relay, sender, sender);
            for i in 0..10 {
                client.send("b1", &format!("{}-{}", sender, i), "T").await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for sender in ["a1", "c1", "d1"] {
        let history = store
            .query(&ConversationKey::derive(sender, "b1"))
            .await
            .unwrap()
            .unwrap();
        let expected: Vec<_> = (0..10)
            .map(|i| Message::new(sender, format!("{}-{}", sender, i), "T"))
            .collect();
        assert_eq!(history, expected);
    }
    assert!(relay.presence().is_empty());
}
