use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};
use helpdesk_shared::types::auth::AuthUser;
use helpdesk_shared::types::pagination::{Paginated, PaginationParams};

use super::{require_active, search_term};
use crate::access;
use crate::models::{
    direct_key, Conversation, ConversationUpdate, MessageType, NewConversation, NewGroup, NewMessage, DIRECT_TITLE,
};
use crate::realtime::{RealtimeEvent, RealtimeHub};
use crate::store::Store;

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn Store>,
    hub: RealtimeHub,
}

impl ConversationService {
    pub fn new(store: Arc<dyn Store>, hub: RealtimeHub) -> Self {
        Self { store, hub }
    }

    /// Return the active direct conversation between the caller and `other`,
    /// creating it if there is none. Concurrent callers converge on one record.
    pub fn create_direct(&self, user: &AuthUser, other: Uuid) -> AppResult<Conversation> {
        if other == user.id {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "cannot start a direct conversation with yourself",
            ));
        }

        let key = direct_key(user.id, other);
        if let Some(existing) = self.store.find_active_direct(user.tenant_id, &key)? {
            return Ok(existing);
        }

        let created = self.store.insert_conversation(NewConversation {
            tenant_id: user.tenant_id,
            title: DIRECT_TITLE.to_string(),
            participants: vec![user.id, other],
            creator_id: user.id,
            description: None,
        });

        match created {
            Ok(conversation) => {
                tracing::info!(
                    conversation_id = %conversation.id,
                    tenant_id = %user.tenant_id,
                    "direct conversation created"
                );
                Ok(conversation)
            }
            // Lost the race: the winner's record is the answer.
            Err(err) if err.code() == ErrorCode::DirectConversationExists => {
                self.store.find_active_direct(user.tenant_id, &key)?.ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn create_group(&self, user: &AuthUser, input: NewGroup) -> AppResult<Conversation> {
        input.validate()?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::new(ErrorCode::GroupTitleInvalid, "title must be 1-100 characters"));
        }

        let mut participants = vec![user.id];
        for id in input.participant_ids {
            if !participants.contains(&id) {
                participants.push(id);
            }
        }
        if participants.len() < 2 {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "a conversation needs at least one other participant",
            ));
        }

        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let conversation = self.store.insert_conversation(NewConversation {
            tenant_id: user.tenant_id,
            title: title.to_string(),
            participants,
            creator_id: user.id,
            description,
        })?;

        tracing::info!(
            conversation_id = %conversation.id,
            participants = conversation.participants.len(),
            is_group = conversation.is_group,
            "group conversation created"
        );
        Ok(conversation)
    }

    pub fn get(&self, user: &AuthUser, id: Uuid) -> AppResult<Conversation> {
        access::member_conversation(self.store.conversation(id)?, user)
    }

    pub fn add_participant(&self, user: &AuthUser, id: Uuid, target: Uuid) -> AppResult<Conversation> {
        let conversation = self.get(user, id)?;
        require_active(&conversation)?;

        let updated = self.store.add_participant(id, target)?;
        self.announce(&updated, user.id, format!("{} added {} to the conversation", user.id, target))?;

        tracing::info!(conversation_id = %id, added = %target, by = %user.id, "participant added");
        Ok(updated)
    }

    pub fn remove_participant(&self, user: &AuthUser, id: Uuid, target: Uuid) -> AppResult<Conversation> {
        let conversation = access::visible_conversation(self.store.conversation(id)?, user)?;
        access::require_self_or_admin(user, target)?;

        if !conversation.has_participant(target) {
            return Err(AppError::not_found("participant not found"));
        }
        if target == conversation.creator_id {
            return Err(AppError::new(
                ErrorCode::CreatorCannotLeave,
                "the creator cannot leave the conversation",
            ));
        }

        let updated = self.store.remove_participant(id, target)?;
        let notice = if target == user.id {
            format!("{target} left the conversation")
        } else {
            format!("{} removed {} from the conversation", user.id, target)
        };
        self.announce(&updated, user.id, notice)?;

        tracing::info!(conversation_id = %id, removed = %target, by = %user.id, "participant removed");
        Ok(updated)
    }

    pub fn update(&self, user: &AuthUser, id: Uuid, update: ConversationUpdate) -> AppResult<Conversation> {
        update.validate()?;
        if update.is_empty() {
            return Err(AppError::new(ErrorCode::ValidationError, "nothing to update"));
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(AppError::new(ErrorCode::GroupTitleInvalid, "title must be 1-100 characters"));
        }

        let conversation = self.get(user, id)?;
        require_active(&conversation)?;

        let update = ConversationUpdate {
            title: update.title.map(|t| t.trim().to_string()),
            description: update.description.map(|d| d.trim().to_string()),
        };
        self.store.update_conversation(id, &update)
    }

    /// Archive the conversation; messages are kept.
    pub fn soft_delete(&self, user: &AuthUser, id: Uuid) -> AppResult<Conversation> {
        let conversation = access::visible_conversation(self.store.conversation(id)?, user)?;
        access::require_member_or_admin(&conversation, user)?;

        let allowed = user.is_admin() || conversation.creator_id == user.id || !conversation.is_group;
        if !allowed {
            return Err(AppError::forbidden(
                "only the creator or an administrator can delete a group conversation",
            ));
        }
        if !conversation.is_active {
            return Ok(conversation);
        }

        let archived = self.store.deactivate_conversation(id)?;
        tracing::info!(conversation_id = %id, by = %user.id, "conversation archived");
        Ok(archived)
    }

    /// Remove a group conversation and all of its messages. Returns how many
    /// messages were removed.
    pub fn hard_delete(&self, user: &AuthUser, id: Uuid) -> AppResult<u64> {
        let conversation = access::visible_conversation(self.store.conversation(id)?, user)?;
        access::require_member_or_admin(&conversation, user)?;

        if !(user.is_admin() || conversation.creator_id == user.id) {
            return Err(AppError::forbidden(
                "only the creator or an administrator can permanently delete a conversation",
            ));
        }
        if !conversation.is_group {
            return Err(AppError::invalid_state("direct conversations can only be archived"));
        }

        let removed = self.store.delete_conversation(id)?;
        tracing::warn!(conversation_id = %id, by = %user.id, messages_removed = removed, "conversation permanently deleted");
        Ok(removed)
    }

    pub fn list_for_user(&self, user: &AuthUser, params: &PaginationParams) -> AppResult<Paginated<Conversation>> {
        let (items, total) =
            self.store
                .conversations_for_user(user.tenant_id, user.id, params.offset(), params.limit())?;
        Ok(Paginated::new(items, total, params))
    }

    pub fn search(&self, user: &AuthUser, raw_term: &str) -> AppResult<Vec<Conversation>> {
        let term = search_term(raw_term)?;
        self.store.search_conversations(user.tenant_id, user.id, term)
    }

    /// Mute for the caller. `None` mutes until cleared.
    pub fn mute(&self, user: &AuthUser, id: Uuid, until: Option<DateTime<Utc>>) -> AppResult<Conversation> {
        if until.is_some_and(|t| t <= Utc::now()) {
            return Err(AppError::new(ErrorCode::ValidationError, "mute expiry must be in the future"));
        }
        self.get(user, id)?;
        self.store.set_mute(id, user.id, until)
    }

    pub fn unmute(&self, user: &AuthUser, id: Uuid) -> AppResult<Conversation> {
        self.get(user, id)?;
        self.store.clear_mute(id, user.id)
    }

    /// Record a membership change in the timeline and push it to subscribers.
    fn announce(&self, conversation: &Conversation, actor: Uuid, text: String) -> AppResult<()> {
        let message = self.store.append_message(NewMessage {
            conversation_id: conversation.id,
            tenant_id: conversation.tenant_id,
            sender_id: actor,
            text,
            message_type: MessageType::System,
            attachments: Vec::new(),
            reply_to: None,
        })?;
        self.hub.publish(RealtimeEvent::new_message(&message));
        Ok(())
    }
}
