//! Persistence seam for conversations and messages.
//!
//! Services own validation and access control; a store only guarantees that
//! each method is atomic with respect to concurrent callers and that the
//! conversation invariants (`is_group` derived from size, one active direct
//! conversation per pair, last-message cache) hold after every call.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Conversation, ConversationUpdate, Message, NewConversation, NewMessage};

pub mod memory;
pub mod postgres;
mod rows;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub trait ConversationStore: Send + Sync {
    fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    fn find_active_direct(&self, tenant_id: Uuid, direct_key: &str) -> AppResult<Option<Conversation>>;

    /// Fails with `DirectConversationExists` when a two-person conversation
    /// collides with an active direct conversation for the same pair.
    fn insert_conversation(&self, new: NewConversation) -> AppResult<Conversation>;

    fn add_participant(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation>;

    fn remove_participant(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation>;

    fn update_conversation(&self, id: Uuid, update: &ConversationUpdate) -> AppResult<Conversation>;

    fn deactivate_conversation(&self, id: Uuid) -> AppResult<Conversation>;

    /// Permanently removes the conversation and all of its messages.
    /// Returns the number of messages removed.
    fn delete_conversation(&self, id: Uuid) -> AppResult<u64>;

    fn set_mute(&self, id: Uuid, user_id: Uuid, muted_until: Option<DateTime<Utc>>) -> AppResult<Conversation>;

    fn clear_mute(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation>;

    /// Active conversations of `user_id`, newest activity first, with the total count.
    fn conversations_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Conversation>, u64)>;

    fn active_conversation_ids(&self, tenant_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    fn search_conversations(&self, tenant_id: Uuid, user_id: Uuid, term: &str) -> AppResult<Vec<Conversation>>;
}

pub trait MessageStore: Send + Sync {
    fn message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Persist the message and, unless it is a system message, refresh the
    /// owning conversation's last-message cache in the same unit of work.
    fn append_message(&self, new: NewMessage) -> AppResult<Message>;

    /// Fails with `MessageDeleted` if the message was tombstoned concurrently.
    fn edit_message(&self, id: Uuid, text: &str, edited_at: DateTime<Utc>) -> AppResult<Message>;

    /// Tombstone the message and refresh the conversation cache.
    fn tombstone_message(&self, id: Uuid, deleted_by: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Message>;

    fn add_reaction(&self, id: Uuid, emoji: &str, user_id: Uuid) -> AppResult<Message>;

    fn remove_reaction(&self, id: Uuid, emoji: &str, user_id: Uuid) -> AppResult<Message>;

    /// Insert a receipt for every message not sent by and not yet read by
    /// `user_id`. Returns the number of receipts inserted.
    fn mark_read(&self, conversation_id: Uuid, user_id: Uuid, read_at: DateTime<Utc>) -> AppResult<u64>;

    /// Raise `sent` messages from other senders to `delivered`.
    fn mark_delivered(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64>;

    fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64>;

    /// Newest first, strictly older than `before` when given.
    fn messages_page(&self, conversation_id: Uuid, before: Option<DateTime<Utc>>, limit: u64) -> AppResult<Vec<Message>>;

    /// Case-insensitive match over non-deleted messages, newest first.
    fn search_messages(
        &self,
        tenant_id: Uuid,
        conversation_ids: &[Uuid],
        term: &str,
        limit: u64,
    ) -> AppResult<Vec<Message>>;
}

pub trait Store: ConversationStore + MessageStore {
    /// Cheap liveness probe for the health endpoint.
    fn ping(&self) -> AppResult<()>;
}

pub fn conversation_not_found() -> AppError {
    AppError::new(ErrorCode::ConversationNotFound, "conversation not found")
}

pub fn message_not_found() -> AppError {
    AppError::new(ErrorCode::MessageNotFound, "message not found")
}

pub fn not_a_member() -> AppError {
    AppError::new(ErrorCode::NotConversationMember, "you are not a member of this conversation")
}

pub fn conversation_inactive() -> AppError {
    AppError::new(ErrorCode::ConversationInactive, "conversation has been deleted")
}

pub(crate) fn direct_pair_taken() -> AppError {
    AppError::new(
        ErrorCode::DirectConversationExists,
        "an active direct conversation already exists for these users",
    )
}

/// Escape `%`, `_` and `\` so a search term matches literally inside `ILIKE`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
