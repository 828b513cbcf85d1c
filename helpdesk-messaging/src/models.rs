use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Text that replaces a message body once it has been soft-deleted.
pub const TOMBSTONE_TEXT: &str = "This message was deleted";
pub const LAST_MESSAGE_MAX_CHARS: usize = 200;
pub const MESSAGE_MAX_CHARS: usize = 5000;
pub const DIRECT_TITLE: &str = "Direct conversation";

// --- Conversation ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuteSetting {
    pub user_id: Uuid,
    pub muted_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub participants: Vec<Uuid>,
    pub creator_id: Uuid,
    pub is_group: bool,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub mutes: Vec<MuteSetting>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// A mute without expiry holds until cleared; an expired one no longer applies.
    pub fn is_muted_for(&self, user_id: Uuid, now: DateTime<Utc>) -> bool {
        self.mutes
            .iter()
            .find(|m| m.user_id == user_id)
            .is_some_and(|m| m.muted_until.map_or(true, |until| until > now))
    }

    /// The other participant of a direct conversation.
    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.is_group {
            return None;
        }
        self.participants.iter().copied().find(|p| *p != user_id)
    }
}

/// `isGroup` is derived from the participant count and never set independently.
pub fn is_group_size(participant_count: usize) -> bool {
    participant_count > 2
}

/// Order-independent key identifying the user pair of a direct conversation.
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low}:{high}")
}

/// Insert payload shared by both store backends.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub tenant_id: Uuid,
    pub title: String,
    pub participants: Vec<Uuid>,
    pub creator_id: Uuid,
    pub description: Option<String>,
}

impl NewConversation {
    pub fn is_group(&self) -> bool {
        is_group_size(self.participants.len())
    }

    pub fn direct_key(&self) -> Option<String> {
        match self.participants.as_slice() {
            [a, b] => Some(direct_key(*a, *b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewGroup {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: String,
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: Option<String>,
}

/// The only conversation fields a member may change.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ConversationUpdate {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: Option<String>,
}

impl ConversationUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

// --- Message ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }

    pub fn carries_attachments(&self) -> bool {
        matches!(self, Self::Image | Self::File)
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown message type: {s}")),
        }
    }
}

/// Ordered so that a status can only ever be raised: sent < delivered < read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    pub fn raised_to(self, other: DeliveryStatus) -> DeliveryStatus {
        self.max(other)
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            _ => Err(format!("unknown delivery status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Attachment {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    #[validate(length(min = 1, max = 255))]
    pub original_name: String,
    #[validate(length(min = 1, max = 127))]
    pub mime_type: String,
    #[validate(range(min = 0))]
    pub size: i64,
    #[validate(length(min = 1))]
    pub path: String,
    pub thumbnail_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub users: Vec<Uuid>,
    pub count: usize,
}

/// Add `user_id` to the `emoji` set. Returns false when it was already there.
pub fn add_reaction(reactions: &mut Vec<Reaction>, emoji: &str, user_id: Uuid) -> bool {
    match reactions.iter_mut().find(|r| r.emoji == emoji) {
        Some(reaction) if reaction.users.contains(&user_id) => false,
        Some(reaction) => {
            reaction.users.push(user_id);
            reaction.count = reaction.users.len();
            true
        }
        None => {
            reactions.push(Reaction {
                emoji: emoji.to_string(),
                users: vec![user_id],
                count: 1,
            });
            true
        }
    }
}

/// Remove `user_id` from the `emoji` set, dropping the entry once empty.
pub fn remove_reaction(reactions: &mut Vec<Reaction>, emoji: &str, user_id: Uuid) -> bool {
    let Some(index) = reactions.iter().position(|r| r.emoji == emoji) else {
        return false;
    };
    let reaction = &mut reactions[index];
    let before = reaction.users.len();
    reaction.users.retain(|u| *u != user_id);
    reaction.count = reaction.users.len();
    let removed = reaction.users.len() != before;
    if reaction.users.is_empty() {
        reactions.remove(index);
    }
    removed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub tenant_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<Uuid>,
    pub reactions: Vec<Reaction>,
    pub status: DeliveryStatus,
    pub read_by: Vec<ReadReceipt>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }

    /// Counts toward `user_id`'s unread total.
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        self.sender_id != user_id && !self.is_read_by(user_id)
    }

    /// Clear content in place; identity, timestamps and position stay.
    pub fn tombstone(&mut self, deleted_by: Uuid, at: DateTime<Utc>) {
        self.text = TOMBSTONE_TEXT.to_string();
        self.attachments.clear();
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(deleted_by);
        self.updated_at = at;
    }

    pub fn preview(&self) -> String {
        last_message_preview(self.message_type, &self.text)
    }
}

/// Insert payload shared by both store backends.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub tenant_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub message_type: MessageType,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<Uuid>,
}

impl NewMessage {
    pub fn into_message(self, id: Uuid, now: DateTime<Utc>) -> Message {
        Message {
            id,
            conversation_id: self.conversation_id,
            tenant_id: self.tenant_id,
            sender_id: self.sender_id,
            text: self.text,
            message_type: self.message_type,
            attachments: self.attachments,
            reply_to: self.reply_to,
            reactions: Vec::new(),
            status: DeliveryStatus::Sent,
            read_by: Vec::new(),
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Client-supplied message content.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewMessageInput {
    #[validate(length(max = 5000, message = "text must be at most 5000 characters"))]
    pub text: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    #[validate]
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MessageEdit {
    #[validate(length(min = 1, max = 5000, message = "text must be 1-5000 characters"))]
    pub text: String,
}

/// Cached conversation preview for a message: its text, or a marker for attachment-only messages.
pub fn last_message_preview(message_type: MessageType, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return match message_type {
            MessageType::Image => "[image]".to_string(),
            MessageType::File => "[file]".to_string(),
            _ => String::new(),
        };
    }
    truncate_preview(text, LAST_MESSAGE_MAX_CHARS)
}

pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars - 3).collect();
    truncated.push_str("...");
    truncated
}
