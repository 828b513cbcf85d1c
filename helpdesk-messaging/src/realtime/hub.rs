use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::RealtimeEvent;

/// Identifies one realtime connection (the Socket.IO socket id).
pub type ConnectionId = String;

pub type EventSender = mpsc::UnboundedSender<RealtimeEvent>;

/// Per-conversation publish/subscribe registry.
///
/// Cheap to clone; every clone shares the same registry. Publishing performs
/// no authorization; callers check membership before `subscribe`.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    connections: DashMap<ConnectionId, EventSender>,
    topics: DashMap<Uuid, HashSet<ConnectionId>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the outbound channel of a newly connected client.
    pub fn register(&self, connection: impl Into<ConnectionId>, sender: EventSender) {
        let connection = connection.into();
        tracing::debug!(connection = %connection, "realtime connection registered");
        self.inner.connections.insert(connection, sender);
    }

    /// Returns false when the connection is unknown (never registered or already gone).
    pub fn subscribe(&self, connection: &str, conversation_id: Uuid) -> bool {
        if !self.inner.connections.contains_key(connection) {
            return false;
        }
        self.inner
            .topics
            .entry(conversation_id)
            .or_default()
            .insert(connection.to_string());
        true
    }

    pub fn unsubscribe(&self, connection: &str, conversation_id: Uuid) {
        if let Some(mut subscribers) = self.inner.topics.get_mut(&conversation_id) {
            subscribers.remove(connection);
        }
        self.inner.topics.remove_if(&conversation_id, |_, subscribers| subscribers.is_empty());
    }

    /// Drop the connection and every subscription it held.
    pub fn disconnect(&self, connection: &str) {
        self.inner.connections.remove(connection);
        self.inner.topics.retain(|_, subscribers| {
            subscribers.remove(connection);
            !subscribers.is_empty()
        });
        tracing::debug!(connection = %connection, "realtime connection dropped");
    }

    /// Deliver to every current subscriber of the event's conversation.
    ///
    /// Never blocks and never fails; returns how many connections accepted
    /// the event. Connections whose receiver is gone are pruned.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let conversation_id = event.conversation_id;
        let kind = event.kind;
        metrics::counter!("realtime_events_published_total", "kind" => kind.as_str()).increment(1);

        let subscribers: Vec<ConnectionId> = match self.inner.topics.get(&conversation_id) {
            Some(subscribers) => subscribers.iter().cloned().collect(),
            None => {
                tracing::debug!(conversation_id = %conversation_id, kind = %kind, "no realtime subscribers");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for connection in subscribers {
            let sent = self
                .inner
                .connections
                .get(&connection)
                .is_some_and(|sender| sender.send(event.clone()).is_ok());
            if sent {
                delivered += 1;
            } else {
                closed.push(connection);
            }
        }

        for connection in closed {
            self.disconnect(&connection);
        }

        tracing::debug!(conversation_id = %conversation_id, kind = %kind, delivered, "realtime event published");
        delivered
    }

    pub fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.inner.topics.get(&conversation_id).map_or(0, |s| s.len())
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Drop every connection and topic. Later publishes reach nobody.
    pub fn shutdown(&self) {
        let connections = self.inner.connections.len();
        self.inner.topics.clear();
        self.inner.connections.clear();
        tracing::info!(connections, "realtime hub shut down");
    }
}
