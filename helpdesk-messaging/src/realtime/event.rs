use serde::Serialize;
use uuid::Uuid;

use crate::models::{Message, Reaction};

// ─── Event kinds ────────────────────────────────────────────────────────────

/// Wire name of a realtime event; also the Socket.IO event name it is emitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NewMessage,
    MessageUpdated,
    MessageDeleted,
    MessageReaction,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "newMessage",
            Self::MessageUpdated => "messageUpdated",
            Self::MessageDeleted => "messageDeleted",
            Self::MessageReaction => "messageReaction",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Payloads ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Message(Box<Message>),
    #[serde(rename_all = "camelCase")]
    Deleted { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Reactions { message_id: Uuid, reactions: Vec<Reaction> },
}

// ─── Envelope ───────────────────────────────────────────────────────────────

/// What a subscriber receives:
///
/// ```json
/// { "kind": "messageDeleted", "conversationId": "...", "payload": { "messageId": "..." } }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub kind: EventKind,
    pub conversation_id: Uuid,
    pub payload: EventPayload,
}

impl RealtimeEvent {
    pub fn new_message(message: &Message) -> Self {
        Self {
            kind: EventKind::NewMessage,
            conversation_id: message.conversation_id,
            payload: EventPayload::Message(Box::new(message.clone())),
        }
    }

    pub fn message_updated(message: &Message) -> Self {
        Self {
            kind: EventKind::MessageUpdated,
            conversation_id: message.conversation_id,
            payload: EventPayload::Message(Box::new(message.clone())),
        }
    }

    /// Carries only the id; subscribers apply the tombstone themselves.
    pub fn message_deleted(conversation_id: Uuid, message_id: Uuid) -> Self {
        Self {
            kind: EventKind::MessageDeleted,
            conversation_id,
            payload: EventPayload::Deleted { message_id },
        }
    }

    /// Carries the full reaction list after the change.
    pub fn message_reaction(message: &Message) -> Self {
        Self {
            kind: EventKind::MessageReaction,
            conversation_id: message.conversation_id,
            payload: EventPayload::Reactions {
                message_id: message.id,
                reactions: message.reactions.clone(),
            },
        }
    }
}
