use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event bus envelope wrapping all domain events.
///
/// Routing key format: `helpdesk.{domain}.{entity}.{action}`
/// Example: `helpdesk.messaging.message.sent`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            tenant_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

pub mod routing_keys {
    pub const MESSAGING_MESSAGE_SENT: &str = "helpdesk.messaging.message.sent";
}

pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageSent {
        pub message_id: Uuid,
        pub conversation_id: Uuid,
        pub sender_id: Uuid,
        pub recipient_ids: Vec<Uuid>,
        pub content_preview: String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_tenant_and_user() {
        let tenant = Uuid::now_v7();
        let user = Uuid::now_v7();
        let event = Event::new("helpdesk-messaging", routing_keys::MESSAGING_MESSAGE_SENT, 7u8)
            .with_tenant(tenant)
            .with_user(user);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "helpdesk.messaging.message.sent");
        assert_eq!(json["tenant_id"], tenant.to_string());
        assert_eq!(json["user_id"], user.to_string());
        assert_eq!(json["data"], 7);
    }
}
