use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};

use super::{
    conversation_inactive, conversation_not_found, direct_pair_taken, message_not_found, not_a_member, ConversationStore,
    MessageStore, Store,
};
use crate::models::{
    self, direct_key, is_group_size, Conversation, ConversationUpdate, DeliveryStatus, Message, MessageType,
    MuteSetting, NewConversation, NewMessage, ReadReceipt,
};

/// Conversations plus the index of active direct pairs, guarded together so
/// check-then-create on a pair is a single critical section.
#[derive(Default)]
struct ConversationTable {
    by_id: HashMap<Uuid, Conversation>,
    direct: HashMap<(Uuid, String), Uuid>,
}

impl ConversationTable {
    fn get_mut(&mut self, id: Uuid) -> AppResult<&mut Conversation> {
        self.by_id.get_mut(&id).ok_or_else(conversation_not_found)
    }

    fn unindex(&mut self, conversation: &Conversation) {
        if let [a, b] = conversation.participants.as_slice() {
            let key = (conversation.tenant_id, direct_key(*a, *b));
            if self.direct.get(&key) == Some(&conversation.id) {
                self.direct.remove(&key);
            }
        }
    }
}

/// Process-local store used in development mode and by the test suite.
///
/// Lock order is always `conversations` before any `messages` shard.
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<ConversationTable>,
    messages: DashMap<Uuid, Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest non-system message in the conversation, by `(created_at, id)`.
    fn latest_visible(&self, conversation_id: Uuid) -> Option<(String, DateTime<Utc>)> {
        self.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.message_type != MessageType::System)
            .max_by_key(|m| (m.created_at, m.id))
            .map(|m| (m.preview(), m.created_at))
    }
}

impl ConversationStore for MemoryStore {
    fn conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.conversations.read().by_id.get(&id).cloned())
    }

    fn find_active_direct(&self, tenant_id: Uuid, key: &str) -> AppResult<Option<Conversation>> {
        let table = self.conversations.read();
        Ok(table
            .direct
            .get(&(tenant_id, key.to_string()))
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    fn insert_conversation(&self, new: NewConversation) -> AppResult<Conversation> {
        let mut table = self.conversations.write();

        let key = new.direct_key();
        if let Some(key) = &key {
            if table.direct.contains_key(&(new.tenant_id, key.clone())) {
                return Err(direct_pair_taken());
            }
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::now_v7(),
            tenant_id: new.tenant_id,
            is_group: new.is_group(),
            title: new.title,
            participants: new.participants,
            creator_id: new.creator_id,
            description: new.description,
            avatar_url: None,
            last_message: None,
            last_message_at: None,
            is_active: true,
            mutes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        if let Some(key) = key {
            table.direct.insert((conversation.tenant_id, key), conversation.id);
        }
        table.by_id.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    fn add_participant(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let mut table = self.conversations.write();
        let snapshot = table.get_mut(id)?.clone();
        if snapshot.has_participant(user_id) {
            return Err(AppError::new(ErrorCode::AlreadyParticipant, "user is already a participant"));
        }
        table.unindex(&snapshot);

        let conversation = table.get_mut(id)?;
        conversation.participants.push(user_id);
        conversation.is_group = is_group_size(conversation.participants.len());
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    fn remove_participant(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let mut table = self.conversations.write();
        let snapshot = table.get_mut(id)?.clone();
        if !snapshot.has_participant(user_id) {
            return Err(AppError::not_found("participant not found"));
        }

        let remaining: Vec<Uuid> = snapshot.participants.iter().copied().filter(|p| *p != user_id).collect();
        if remaining.len() < 2 {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "a conversation must keep at least two participants",
            ));
        }

        let new_key = match remaining.as_slice() {
            [a, b] if snapshot.is_active => Some((snapshot.tenant_id, direct_key(*a, *b))),
            _ => None,
        };
        if let Some(key) = &new_key {
            if table.direct.get(key).is_some_and(|other| *other != id) {
                return Err(direct_pair_taken());
            }
        }

        table.unindex(&snapshot);
        if let Some(key) = new_key {
            table.direct.insert(key, id);
        }

        let conversation = table.get_mut(id)?;
        conversation.participants = remaining;
        conversation.is_group = is_group_size(conversation.participants.len());
        conversation.mutes.retain(|m| m.user_id != user_id);
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    fn update_conversation(&self, id: Uuid, update: &ConversationUpdate) -> AppResult<Conversation> {
        let mut table = self.conversations.write();
        let conversation = table.get_mut(id)?;
        if let Some(title) = &update.title {
            conversation.title = title.clone();
        }
        if let Some(description) = &update.description {
            conversation.description = (!description.is_empty()).then(|| description.clone());
        }
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    fn deactivate_conversation(&self, id: Uuid) -> AppResult<Conversation> {
        let mut table = self.conversations.write();
        let snapshot = table.get_mut(id)?.clone();
        table.unindex(&snapshot);

        let conversation = table.get_mut(id)?;
        conversation.is_active = false;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    fn delete_conversation(&self, id: Uuid) -> AppResult<u64> {
        let mut table = self.conversations.write();
        let conversation = table.by_id.remove(&id).ok_or_else(conversation_not_found)?;
        table.unindex(&conversation);

        let before = self.messages.len();
        self.messages.retain(|_, m| m.conversation_id != id);
        Ok((before - self.messages.len()) as u64)
    }

    fn set_mute(&self, id: Uuid, user_id: Uuid, muted_until: Option<DateTime<Utc>>) -> AppResult<Conversation> {
        let mut table = self.conversations.write();
        let conversation = table.get_mut(id)?;
        match conversation.mutes.iter_mut().find(|m| m.user_id == user_id) {
            Some(mute) => mute.muted_until = muted_until,
            None => conversation.mutes.push(MuteSetting { user_id, muted_until }),
        }
        Ok(conversation.clone())
    }

    fn clear_mute(&self, id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        let mut table = self.conversations.write();
        let conversation = table.get_mut(id)?;
        conversation.mutes.retain(|m| m.user_id != user_id);
        Ok(conversation.clone())
    }

    fn conversations_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<(Vec<Conversation>, u64)> {
        let table = self.conversations.read();
        let mut visible: Vec<&Conversation> = table
            .by_id
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.is_active && c.has_participant(user_id))
            .collect();
        // `None` sorts below `Some`, so reversing puts never-messaged conversations last.
        visible.sort_by(|a, b| (b.last_message_at, b.created_at).cmp(&(a.last_message_at, a.created_at)));

        let total = visible.len() as u64;
        let page = visible
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    fn active_conversation_ids(&self, tenant_id: Uuid, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let table = self.conversations.read();
        Ok(table
            .by_id
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.is_active && c.has_participant(user_id))
            .map(|c| c.id)
            .collect())
    }

    fn search_conversations(&self, tenant_id: Uuid, user_id: Uuid, term: &str) -> AppResult<Vec<Conversation>> {
        let needle = term.to_lowercase();
        let table = self.conversations.read();
        let mut found: Vec<Conversation> = table
            .by_id
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.is_active && c.has_participant(user_id))
            .filter(|c| {
                c.title.to_lowercase().contains(&needle)
                    || c.description.as_deref().is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.last_message_at, b.created_at).cmp(&(a.last_message_at, a.created_at)));
        Ok(found)
    }
}

impl MessageStore for MemoryStore {
    fn message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.messages.get(&id).map(|m| m.clone()))
    }

    fn append_message(&self, new: NewMessage) -> AppResult<Message> {
        let mut table = self.conversations.write();
        let conversation = table.get_mut(new.conversation_id)?;
        // Membership may have changed since the caller was authorized.
        if new.message_type != MessageType::System {
            if !conversation.is_active {
                return Err(conversation_inactive());
            }
            if !conversation.has_participant(new.sender_id) {
                return Err(not_a_member());
            }
        }

        let message = new.into_message(Uuid::now_v7(), Utc::now());
        if message.message_type != MessageType::System {
            conversation.last_message = Some(message.preview());
            conversation.last_message_at = Some(message.created_at);
            conversation.updated_at = message.created_at;
        }
        self.messages.insert(message.id, message.clone());
        Ok(message)
    }

    fn edit_message(&self, id: Uuid, text: &str, edited_at: DateTime<Utc>) -> AppResult<Message> {
        let mut message = self.messages.get_mut(&id).ok_or_else(message_not_found)?;
        if message.is_deleted {
            return Err(AppError::new(ErrorCode::MessageDeleted, "message has been deleted"));
        }
        message.text = text.to_string();
        message.is_edited = true;
        message.edited_at = Some(edited_at);
        message.updated_at = edited_at;
        Ok(message.clone())
    }

    fn tombstone_message(&self, id: Uuid, deleted_by: Uuid, deleted_at: DateTime<Utc>) -> AppResult<Message> {
        let mut table = self.conversations.write();

        let message = {
            let mut message = self.messages.get_mut(&id).ok_or_else(message_not_found)?;
            if !message.is_deleted {
                message.tombstone(deleted_by, deleted_at);
            }
            message.clone()
        };

        if message.message_type != MessageType::System {
            let latest = self.latest_visible(message.conversation_id);
            if let Ok(conversation) = table.get_mut(message.conversation_id) {
                conversation.last_message = latest.as_ref().map(|(preview, _)| preview.clone());
                conversation.last_message_at = latest.map(|(_, at)| at);
            }
        }
        Ok(message)
    }

    fn add_reaction(&self, id: Uuid, emoji: &str, user_id: Uuid) -> AppResult<Message> {
        let mut message = self.messages.get_mut(&id).ok_or_else(message_not_found)?;
        if message.is_deleted {
            return Err(AppError::new(ErrorCode::MessageDeleted, "message has been deleted"));
        }
        models::add_reaction(&mut message.reactions, emoji, user_id);
        Ok(message.clone())
    }

    fn remove_reaction(&self, id: Uuid, emoji: &str, user_id: Uuid) -> AppResult<Message> {
        let mut message = self.messages.get_mut(&id).ok_or_else(message_not_found)?;
        models::remove_reaction(&mut message.reactions, emoji, user_id);
        Ok(message.clone())
    }

    fn mark_read(&self, conversation_id: Uuid, user_id: Uuid, read_at: DateTime<Utc>) -> AppResult<u64> {
        let mut marked = 0;
        for mut message in self.messages.iter_mut() {
            if message.conversation_id == conversation_id && message.is_unread_for(user_id) {
                message.read_by.push(ReadReceipt { user_id, read_at });
                message.status = message.status.raised_to(DeliveryStatus::Read);
                marked += 1;
            }
        }
        Ok(marked)
    }

    fn mark_delivered(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        let mut raised = 0;
        for mut message in self.messages.iter_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != user_id
                && message.status == DeliveryStatus::Sent
            {
                message.status = DeliveryStatus::Delivered;
                raised += 1;
            }
        }
        Ok(raised)
    }

    fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<u64> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.is_unread_for(user_id))
            .count() as u64)
    }

    fn messages_page(&self, conversation_id: Uuid, before: Option<DateTime<Utc>>, limit: u64) -> AppResult<Vec<Message>> {
        let mut page: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| before.map_or(true, |cursor| m.created_at < cursor))
            .map(|m| m.clone())
            .collect();
        page.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        page.truncate(limit as usize);
        Ok(page)
    }

    fn search_messages(
        &self,
        tenant_id: Uuid,
        conversation_ids: &[Uuid],
        term: &str,
        limit: u64,
    ) -> AppResult<Vec<Message>> {
        let needle = term.to_lowercase();
        let mut found: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.tenant_id == tenant_id && !m.is_deleted && conversation_ids.contains(&m.conversation_id))
            .filter(|m| m.text.to_lowercase().contains(&needle))
            .map(|m| m.clone())
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        found.truncate(limit as usize);
        Ok(found)
    }
}

impl Store for MemoryStore {
    fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
