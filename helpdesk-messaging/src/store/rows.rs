use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use helpdesk_shared::errors::{AppError, AppResult};

use crate::models::{Attachment, Conversation, Message, MuteSetting, Reaction, ReadReceipt};
use crate::schema::{
    conversation_mutes, conversation_participants, conversations, message_attachments, message_reactions,
    message_read_receipts, messages,
};

// --- Conversation ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone)]
#[diesel(table_name = conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ConversationRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub creator_id: Uuid,
    pub is_group: bool,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub direct_key: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn into_conversation(self, participants: Vec<Uuid>, mutes: Vec<MuteSetting>) -> Conversation {
        Conversation {
            id: self.id,
            tenant_id: self.tenant_id,
            title: self.title,
            participants,
            creator_id: self.creator_id,
            is_group: self.is_group,
            description: self.description,
            avatar_url: self.avatar_url,
            last_message: self.last_message,
            last_message_at: self.last_message_at,
            is_active: self.is_active,
            mutes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = conversations)]
pub struct NewConversationRow<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: &'a str,
    pub creator_id: Uuid,
    pub is_group: bool,
    pub description: Option<&'a str>,
    pub direct_key: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `None` leaves a column untouched; `Some(None)` clears the description.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = conversations)]
pub struct ConversationChanges<'a> {
    pub title: Option<&'a str>,
    pub description: Option<Option<&'a str>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = conversation_participants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ParticipantRow {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = conversation_mutes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MuteRow {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub muted_until: Option<DateTime<Utc>>,
}

// --- Message ---

#[derive(Debug, Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub tenant_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub message_type: String,
    pub reply_to: Option<Uuid>,
    pub status: String,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            tenant_id: message.tenant_id,
            sender_id: message.sender_id,
            body: message.text.clone(),
            message_type: message.message_type.as_str().to_string(),
            reply_to: message.reply_to,
            status: message.status.as_str().to_string(),
            is_edited: message.is_edited,
            edited_at: message.edited_at,
            is_deleted: message.is_deleted,
            deleted_at: message.deleted_at,
            deleted_by: message.deleted_by,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }

    pub fn into_message(
        self,
        attachments: Vec<Attachment>,
        reactions: Vec<Reaction>,
        read_by: Vec<ReadReceipt>,
    ) -> AppResult<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            tenant_id: self.tenant_id,
            sender_id: self.sender_id,
            text: self.body,
            message_type: self.message_type.parse().map_err(AppError::internal)?,
            attachments,
            reply_to: self.reply_to,
            reactions,
            status: self.status.parse().map_err(AppError::internal)?,
            read_by,
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = message_attachments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AttachmentRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub position: i32,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
}

impl AttachmentRow {
    pub fn new(message_id: Uuid, position: usize, attachment: &Attachment) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_id,
            position: position as i32,
            filename: attachment.filename.clone(),
            original_name: attachment.original_name.clone(),
            mime_type: attachment.mime_type.clone(),
            size_bytes: attachment.size,
            storage_path: attachment.path.clone(),
            thumbnail_path: attachment.thumbnail_path.clone(),
        }
    }

    pub fn into_attachment(self) -> Attachment {
        Attachment {
            filename: self.filename,
            original_name: self.original_name,
            mime_type: self.mime_type,
            size: self.size_bytes,
            path: self.storage_path,
            thumbnail_path: self.thumbnail_path,
        }
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = message_reactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReactionRow {
    pub message_id: Uuid,
    pub emoji: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = message_read_receipts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReceiptRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Fold reaction rows (ordered by `created_at`) into per-emoji sets, keeping
/// the order in which each emoji was first used.
pub fn group_reactions(rows: impl IntoIterator<Item = ReactionRow>) -> Vec<Reaction> {
    let mut reactions: Vec<Reaction> = Vec::new();
    for row in rows {
        crate::models::add_reaction(&mut reactions, &row.emoji, row.user_id);
    }
    reactions
}
