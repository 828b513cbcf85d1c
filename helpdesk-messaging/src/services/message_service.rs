use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};
use helpdesk_shared::types::auth::AuthUser;

use super::{require_active, search_term};
use crate::access;
use crate::events::EventPublisher;
use crate::models::{Conversation, Message, MessageEdit, MessageType, NewMessage, NewMessageInput};
use crate::realtime::{RealtimeEvent, RealtimeHub};
use crate::store::Store;

pub const DEFAULT_PAGE_LIMIT: u64 = 50;
pub const MAX_PAGE_LIMIT: u64 = 100;
pub const SEARCH_RESULT_LIMIT: u64 = 100;
pub const EMOJI_MAX_CHARS: usize = 32;

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn Store>,
    hub: RealtimeHub,
    events: Option<EventPublisher>,
}

impl MessageService {
    pub fn new(store: Arc<dyn Store>, hub: RealtimeHub, events: Option<EventPublisher>) -> Self {
        Self { store, hub, events }
    }

    fn conversation_for(&self, user: &AuthUser, id: Uuid) -> AppResult<Conversation> {
        access::member_conversation(self.store.conversation(id)?, user)
    }

    /// The message plus its conversation, both checked against the caller.
    fn message_for(&self, user: &AuthUser, id: Uuid) -> AppResult<(Message, Conversation)> {
        let message = access::visible_message(self.store.message(id)?, user)?;
        let conversation = self.conversation_for(user, message.conversation_id)?;
        Ok((message, conversation))
    }

    pub fn append(&self, user: &AuthUser, conversation_id: Uuid, input: NewMessageInput) -> AppResult<Message> {
        input.validate()?;

        let conversation = self.conversation_for(user, conversation_id)?;
        require_active(&conversation)?;

        let text = input.text.unwrap_or_default();
        match input.message_type {
            MessageType::System => {
                return Err(AppError::new(ErrorCode::ValidationError, "system messages are server-generated"));
            }
            MessageType::Text if text.trim().is_empty() => {
                return Err(AppError::new(ErrorCode::ValidationError, "text is required"));
            }
            MessageType::Text if !input.attachments.is_empty() => {
                return Err(AppError::new(
                    ErrorCode::ValidationError,
                    "text messages cannot carry attachments",
                ));
            }
            kind if kind.carries_attachments() && input.attachments.is_empty() => {
                return Err(AppError::new(
                    ErrorCode::ValidationError,
                    format!("{} messages require at least one attachment", kind.as_str()),
                ));
            }
            _ => {}
        }

        if let Some(reply_to) = input.reply_to {
            let same_conversation = self
                .store
                .message(reply_to)?
                .is_some_and(|target| target.conversation_id == conversation_id);
            if !same_conversation {
                return Err(AppError::new(
                    ErrorCode::ValidationError,
                    "reply target must be a message in the same conversation",
                ));
            }
        }

        let message = self.store.append_message(NewMessage {
            conversation_id,
            tenant_id: user.tenant_id,
            sender_id: user.id,
            text,
            message_type: input.message_type,
            attachments: input.attachments,
            reply_to: input.reply_to,
        })?;

        metrics::counter!("messages_appended_total", "type" => message.message_type.as_str()).increment(1);
        let delivered = self.hub.publish(RealtimeEvent::new_message(&message));
        if let Some(events) = &self.events {
            events.message_sent(&conversation, &message);
        }

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            sender_id = %user.id,
            message_type = message.message_type.as_str(),
            delivered,
            "message appended"
        );
        Ok(message)
    }

    pub fn get(&self, user: &AuthUser, id: Uuid) -> AppResult<Message> {
        self.message_for(user, id).map(|(message, _)| message)
    }

    pub fn edit(&self, user: &AuthUser, id: Uuid, edit: MessageEdit) -> AppResult<Message> {
        edit.validate()?;
        if edit.text.trim().is_empty() {
            return Err(AppError::new(ErrorCode::ValidationError, "text is required"));
        }

        let (message, _) = self.message_for(user, id)?;
        if message.sender_id != user.id {
            return Err(AppError::new(ErrorCode::NotMessageSender, "only the sender can edit a message"));
        }
        if message.is_deleted {
            return Err(AppError::new(ErrorCode::MessageDeleted, "message has been deleted"));
        }
        if message.text == edit.text {
            return Ok(message);
        }

        let edited = self.store.edit_message(id, &edit.text, Utc::now())?;
        self.hub.publish(RealtimeEvent::message_updated(&edited));
        tracing::info!(message_id = %id, "message edited");
        Ok(edited)
    }

    /// Tombstone the message. Deleting an already deleted message is a no-op.
    pub fn delete(&self, user: &AuthUser, id: Uuid) -> AppResult<Message> {
        let message = access::visible_message(self.store.message(id)?, user)?;
        let conversation = access::visible_conversation(self.store.conversation(message.conversation_id)?, user)?;
        access::require_member_or_admin(&conversation, user)?;

        if message.sender_id != user.id && !user.is_admin() {
            return Err(AppError::new(
                ErrorCode::NotMessageSender,
                "only the sender or an administrator can delete a message",
            ));
        }
        if message.is_deleted {
            return Ok(message);
        }

        let deleted = self.store.tombstone_message(id, user.id, Utc::now())?;
        self.hub.publish(RealtimeEvent::message_deleted(deleted.conversation_id, deleted.id));
        tracing::info!(message_id = %id, by = %user.id, "message deleted");
        Ok(deleted)
    }

    pub fn add_reaction(&self, user: &AuthUser, id: Uuid, emoji: &str) -> AppResult<Message> {
        let emoji = validate_emoji(emoji)?;
        self.reactable(user, id)?;

        let message = self.store.add_reaction(id, emoji, user.id)?;
        self.hub.publish(RealtimeEvent::message_reaction(&message));
        Ok(message)
    }

    pub fn remove_reaction(&self, user: &AuthUser, id: Uuid, emoji: &str) -> AppResult<Message> {
        let emoji = validate_emoji(emoji)?;
        self.reactable(user, id)?;

        let message = self.store.remove_reaction(id, emoji, user.id)?;
        self.hub.publish(RealtimeEvent::message_reaction(&message));
        Ok(message)
    }

    fn reactable(&self, user: &AuthUser, id: Uuid) -> AppResult<()> {
        let (message, _) = self.message_for(user, id)?;
        if message.is_deleted {
            return Err(AppError::new(ErrorCode::MessageDeleted, "cannot react to a deleted message"));
        }
        Ok(())
    }

    /// Read receipts for every message from others the caller has not read.
    pub fn mark_read(&self, user: &AuthUser, conversation_id: Uuid) -> AppResult<u64> {
        self.conversation_for(user, conversation_id)?;
        let marked = self.store.mark_read(conversation_id, user.id, Utc::now())?;
        if marked > 0 {
            tracing::debug!(conversation_id = %conversation_id, user_id = %user.id, marked, "messages marked read");
        }
        Ok(marked)
    }

    pub fn mark_delivered(&self, user: &AuthUser, conversation_id: Uuid) -> AppResult<u64> {
        self.conversation_for(user, conversation_id)?;
        self.store.mark_delivered(conversation_id, user.id)
    }

    pub fn unread_count(&self, user: &AuthUser, conversation_id: Uuid) -> AppResult<u64> {
        self.conversation_for(user, conversation_id)?;
        self.store.unread_count(conversation_id, user.id)
    }

    /// Unread messages across every active conversation of the caller.
    pub fn total_unread(&self, user: &AuthUser) -> AppResult<u64> {
        let mut total = 0;
        for id in self.store.active_conversation_ids(user.tenant_id, user.id)? {
            total += self.store.unread_count(id, user.id)?;
        }
        Ok(total)
    }

    /// Newest first; `limit` defaults to 50 and is clamped to 1..=100.
    pub fn fetch_page(
        &self,
        user: &AuthUser,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> AppResult<Vec<Message>> {
        self.conversation_for(user, conversation_id)?;
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        self.store.messages_page(conversation_id, before, limit)
    }

    pub fn search(&self, user: &AuthUser, raw_term: &str) -> AppResult<Vec<Message>> {
        let term = search_term(raw_term)?;
        let ids = self.store.active_conversation_ids(user.tenant_id, user.id)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_messages(user.tenant_id, &ids, term, SEARCH_RESULT_LIMIT)
    }
}

fn validate_emoji(raw: &str) -> AppResult<&str> {
    let emoji = raw.trim();
    let len = emoji.chars().count();
    if len == 0 || len > EMOJI_MAX_CHARS {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("emoji must be 1-{EMOJI_MAX_CHARS} characters"),
        ));
    }
    Ok(emoji)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, DeliveryStatus, NewGroup, LAST_MESSAGE_MAX_CHARS, TOMBSTONE_TEXT};
    use crate::realtime::EventKind;
    use crate::services::testing::Fixture;
    use helpdesk_shared::errors::ErrorKind;
    use helpdesk_shared::types::auth::UserRole;
    use tokio::sync::mpsc;

    fn text(body: &str) -> NewMessageInput {
        NewMessageInput {
            text: Some(body.into()),
            ..Default::default()
        }
    }

    fn pdf() -> Attachment {
        Attachment {
            filename: "0191-report.pdf".into(),
            original_name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            size: 2048,
            path: "helpdesk-attachments/0191-report.pdf".into(),
            thumbnail_path: None,
        }
    }

    #[test]
    fn append_refreshes_preview() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.user(UserRole::Agent));
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();

        fx.messages.append(&a, conv.id, text("hello")).unwrap();
        assert_eq!(fx.conversations.get(&a, conv.id).unwrap().last_message.as_deref(), Some("hello"));

        let long = "z".repeat(250);
        fx.messages.append(&b, conv.id, text(&long)).unwrap();
        let preview = fx.conversations.get(&a, conv.id).unwrap().last_message.unwrap();
        assert_eq!(preview.chars().count(), LAST_MESSAGE_MAX_CHARS);
        assert_eq!(preview, format!("{}...", &long[..197]));
    }

    #[test]
    fn append_validates_content() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();

        let err = fx.messages.append(&a, conv.id, text("   ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = fx.messages.append(&a, conv.id, text(&"x".repeat(5001))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(fx.messages.append(&a, conv.id, text(&"x".repeat(5000))).is_ok());

        let system = NewMessageInput {
            text: Some("spoofed".into()),
            message_type: MessageType::System,
            ..Default::default()
        };
        assert_eq!(fx.messages.append(&a, conv.id, system).unwrap_err().kind(), ErrorKind::Validation);

        let bare_file = NewMessageInput {
            message_type: MessageType::File,
            ..Default::default()
        };
        assert_eq!(fx.messages.append(&a, conv.id, bare_file).unwrap_err().kind(), ErrorKind::Validation);

        let file = NewMessageInput {
            message_type: MessageType::File,
            attachments: vec![pdf()],
            ..Default::default()
        };
        let sent = fx.messages.append(&a, conv.id, file).unwrap();
        assert_eq!(sent.attachments.len(), 1);
        assert_eq!(fx.conversations.get(&a, conv.id).unwrap().last_message.as_deref(), Some("[file]"));
    }

    #[test]
    fn non_member_cannot_append() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();

        let err = fx.messages.append(&fx.user(UserRole::Admin), conv.id, text("hi")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotConversationMember);
    }

    #[test]
    fn archived_conversation_rejects_messages() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        fx.conversations.soft_delete(&a, conv.id).unwrap();

        let err = fx.messages.append(&a, conv.id, text("hi")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConversationInactive);
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn reply_must_stay_in_conversation() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.customer(), fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        let other = fx.conversations.create_direct(&a, c.id).unwrap();
        let elsewhere = fx.messages.append(&a, other.id, text("elsewhere")).unwrap();
        let here = fx.messages.append(&a, conv.id, text("here")).unwrap();

        let mut reply = text("re");
        reply.reply_to = Some(elsewhere.id);
        assert_eq!(fx.messages.append(&b, conv.id, reply).unwrap_err().kind(), ErrorKind::Validation);

        let mut reply = text("re");
        reply.reply_to = Some(here.id);
        assert_eq!(fx.messages.append(&b, conv.id, reply).unwrap().reply_to, Some(here.id));
    }

    #[test]
    fn only_sender_edits() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        let sent = fx.messages.append(&a, conv.id, text("draft")).unwrap();

        let err = fx.messages.edit(&b, sent.id, MessageEdit { text: "hijack".into() }).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotMessageSender);

        let same = fx.messages.edit(&a, sent.id, MessageEdit { text: "draft".into() }).unwrap();
        assert!(!same.is_edited);

        let edited = fx.messages.edit(&a, sent.id, MessageEdit { text: "final".into() }).unwrap();
        assert!(edited.is_edited);
        assert!(edited.edited_at.is_some());
        assert_eq!(edited.text, "final");

        fx.messages.delete(&a, sent.id).unwrap();
        let err = fx.messages.edit(&a, sent.id, MessageEdit { text: "again".into() }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn delete_tombstones_in_place() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let admin = fx.user(UserRole::Admin);
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        let file = NewMessageInput {
            text: Some("see attached".into()),
            message_type: MessageType::File,
            attachments: vec![pdf()],
            ..Default::default()
        };
        let sent = fx.messages.append(&a, conv.id, file).unwrap();

        let err = fx.messages.delete(&b, sent.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let deleted = fx.messages.delete(&admin, sent.id).unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.text, TOMBSTONE_TEXT);
        assert!(deleted.attachments.is_empty());
        assert_eq!(deleted.id, sent.id);
        assert_eq!(deleted.created_at, sent.created_at);
        assert_eq!(deleted.deleted_by, Some(admin.id));

        let again = fx.messages.delete(&a, sent.id).unwrap();
        assert_eq!(again.deleted_at, deleted.deleted_at);

        let page = fx.messages.fetch_page(&b, conv.id, None, None).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, sent.id);
    }

    #[test]
    fn reactions_are_sets() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        let sent = fx.messages.append(&a, conv.id, text("great news")).unwrap();

        fx.messages.add_reaction(&b, sent.id, "👍").unwrap();
        fx.messages.add_reaction(&b, sent.id, "👍").unwrap();
        let reacted = fx.messages.add_reaction(&b, sent.id, "❤️").unwrap();
        assert_eq!(reacted.reactions.len(), 2);
        assert!(reacted.reactions.iter().all(|r| r.count == 1));

        let removed = fx.messages.remove_reaction(&b, sent.id, "❤️").unwrap();
        assert_eq!(removed.reactions.len(), 1);

        assert_eq!(fx.messages.add_reaction(&b, sent.id, "").unwrap_err().kind(), ErrorKind::Validation);
        let outsider = fx.customer();
        assert_eq!(
            fx.messages.add_reaction(&outsider, sent.id, "👍").unwrap_err().code(),
            ErrorCode::NotConversationMember
        );

        fx.messages.delete(&a, sent.id).unwrap();
        assert_eq!(fx.messages.add_reaction(&b, sent.id, "🎉").unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn read_receipts_are_idempotent() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        for body in ["one", "two", "three"] {
            fx.messages.append(&a, conv.id, text(body)).unwrap();
        }

        assert_eq!(fx.messages.unread_count(&b, conv.id).unwrap(), 3);
        assert_eq!(fx.messages.total_unread(&b).unwrap(), 3);
        assert_eq!(fx.messages.mark_read(&b, conv.id).unwrap(), 3);
        assert_eq!(fx.messages.unread_count(&b, conv.id).unwrap(), 0);
        assert_eq!(fx.messages.mark_read(&b, conv.id).unwrap(), 0);

        for message in fx.messages.fetch_page(&b, conv.id, None, None).unwrap() {
            assert_eq!(message.read_by.iter().filter(|r| r.user_id == b.id).count(), 1);
            assert_eq!(message.status, DeliveryStatus::Read);
        }
        assert_eq!(fx.messages.unread_count(&a, conv.id).unwrap(), 0);
    }

    #[test]
    fn page_limit_is_clamped() {
        let fx = Fixture::new();
        let (a, b) = (fx.customer(), fx.customer());
        let conv = fx.conversations.create_direct(&a, b.id).unwrap();
        for i in 0..3 {
            fx.messages.append(&a, conv.id, text(&format!("m{i}"))).unwrap();
        }

        assert_eq!(fx.messages.fetch_page(&a, conv.id, None, Some(0)).unwrap().len(), 1);
        assert_eq!(fx.messages.fetch_page(&a, conv.id, None, Some(1000)).unwrap().len(), 3);
    }

    #[test]
    fn search_stays_inside_callers_conversations() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.customer(), fx.customer(), fx.customer());
        let mine = fx.conversations.create_direct(&a, b.id).unwrap();
        let theirs = fx.conversations.create_direct(&b, c.id).unwrap();
        let hit = fx.messages.append(&a, mine.id, text("Password reset link")).unwrap();
        fx.messages.append(&b, theirs.id, text("password reset too")).unwrap();
        let gone = fx.messages.append(&a, mine.id, text("old password")).unwrap();
        fx.messages.delete(&a, gone.id).unwrap();

        let found = fx.messages.search(&a, "password").unwrap();
        assert_eq!(found.iter().map(|m| m.id).collect::<Vec<_>>(), [hit.id]);
        assert!(fx.messages.search(&a, "").is_err());
    }

    #[test]
    fn events_reach_subscribers() {
        let fx = Fixture::new();
        let (owner, b, c) = (fx.user(UserRole::Agent), fx.customer(), fx.customer());
        let conv = fx
            .conversations
            .create_group(
                &owner,
                NewGroup {
                    title: "Support".into(),
                    participant_ids: vec![b.id, c.id],
                    description: None,
                },
            )
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.hub.register("socket-b", tx);
        fx.hub.subscribe("socket-b", conv.id);

        let sent = fx.messages.append(&owner, conv.id, text("hi all")).unwrap();
        fx.messages.edit(&owner, sent.id, MessageEdit { text: "hi everyone".into() }).unwrap();
        fx.messages.add_reaction(&c, sent.id, "👋").unwrap();
        fx.messages.delete(&owner, sent.id).unwrap();

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                EventKind::NewMessage,
                EventKind::MessageUpdated,
                EventKind::MessageReaction,
                EventKind::MessageDeleted
            ]
        );
    }
}
