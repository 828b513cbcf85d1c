use helpdesk_shared::clients::rabbitmq::RabbitMQClient;
use helpdesk_shared::types::event::{payloads, routing_keys, Event};

use crate::models::{truncate_preview, Conversation, Message};

pub const SOURCE: &str = "helpdesk-messaging";
const CONTENT_PREVIEW_CHARS: usize = 100;

/// Domain events for downstream consumers (notifications, analytics).
#[derive(Clone)]
pub struct EventPublisher {
    rabbitmq: RabbitMQClient,
}

impl EventPublisher {
    pub fn new(rabbitmq: RabbitMQClient) -> Self {
        Self { rabbitmq }
    }

    /// Publish `message.sent` in the background. Failures are logged only.
    pub fn message_sent(&self, conversation: &Conversation, message: &Message) {
        let event = message_sent_event(conversation, message);
        let rabbitmq = self.rabbitmq.clone();
        tokio::spawn(async move {
            if let Err(e) = rabbitmq.publish(routing_keys::MESSAGING_MESSAGE_SENT, &event).await {
                tracing::error!(error = %e, event_id = %event.id, "failed to publish message.sent event");
            }
        });
    }
}

pub fn message_sent_event(conversation: &Conversation, message: &Message) -> Event<payloads::MessageSent> {
    let recipient_ids = conversation
        .participants
        .iter()
        .copied()
        .filter(|p| *p != message.sender_id)
        .collect();

    Event::new(
        SOURCE,
        routing_keys::MESSAGING_MESSAGE_SENT,
        payloads::MessageSent {
            message_id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            recipient_ids,
            content_preview: truncate_preview(&message.preview(), CONTENT_PREVIEW_CHARS),
        },
    )
    .with_tenant(message.tenant_id)
    .with_user(message.sender_id)
}
