//! Tenant isolation and membership checks run before every conversation or
//! message operation.
//!
//! A record in another tenant is reported exactly like a missing one.
//! Administrators skip the membership check only for moderation
//! (deletes); reads always require membership.

use uuid::Uuid;

use helpdesk_shared::errors::{AppError, AppResult};
use helpdesk_shared::types::auth::AuthUser;

use crate::models::{Conversation, Message};
use crate::store::{conversation_not_found, message_not_found, not_a_member};

/// The conversation as the caller may see it: present and in their tenant.
pub fn visible_conversation(conversation: Option<Conversation>, user: &AuthUser) -> AppResult<Conversation> {
    conversation
        .filter(|c| c.tenant_id == user.tenant_id)
        .ok_or_else(conversation_not_found)
}

pub fn visible_message(message: Option<Message>, user: &AuthUser) -> AppResult<Message> {
    message
        .filter(|m| m.tenant_id == user.tenant_id)
        .ok_or_else(message_not_found)
}

pub fn require_member(conversation: &Conversation, user: &AuthUser) -> AppResult<()> {
    if conversation.has_participant(user.id) {
        Ok(())
    } else {
        Err(not_a_member())
    }
}

/// Visible and the caller participates.
pub fn member_conversation(conversation: Option<Conversation>, user: &AuthUser) -> AppResult<Conversation> {
    let conversation = visible_conversation(conversation, user)?;
    require_member(&conversation, user)?;
    Ok(conversation)
}

/// Membership check for moderation actions, which administrators bypass.
pub fn require_member_or_admin(conversation: &Conversation, user: &AuthUser) -> AppResult<()> {
    if user.is_admin() {
        return Ok(());
    }
    require_member(conversation, user)
}

pub fn require_self_or_admin(user: &AuthUser, target: Uuid) -> AppResult<()> {
    if user.id == target || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("only the user themselves or an administrator may do this"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DIRECT_TITLE;
    use chrono::Utc;
    use helpdesk_shared::errors::{ErrorCode, ErrorKind};
    use helpdesk_shared::types::auth::UserRole;

    fn conversation(tenant_id: Uuid, participants: Vec<Uuid>) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::now_v7(),
            tenant_id,
            title: DIRECT_TITLE.into(),
            creator_id: participants[0],
            is_group: participants.len() > 2,
            participants,
            description: None,
            avatar_url: None,
            last_message: None,
            last_message_at: None,
            is_active: true,
            mutes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn other_tenant_looks_missing() {
        let tenant = Uuid::now_v7();
        let member = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Agent);
        let conv = conversation(tenant, vec![member.id, Uuid::now_v7()]);

        // Same user id, other tenant.
        let outsider = AuthUser::new(member.id, Uuid::now_v7(), UserRole::Admin);
        let hidden = member_conversation(Some(conv.clone()), &outsider).unwrap_err();
        let missing = member_conversation(None, &member).unwrap_err();
        assert_eq!(hidden.code(), ErrorCode::ConversationNotFound);
        assert_eq!(hidden.code(), missing.code());
        assert_eq!(hidden.to_string(), missing.to_string());

        assert!(member_conversation(Some(conv), &member).is_ok());
    }

    #[test]
    fn admin_reads_still_need_membership() {
        let tenant = Uuid::now_v7();
        let conv = conversation(tenant, vec![Uuid::now_v7(), Uuid::now_v7()]);
        let admin = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Admin);

        let err = member_conversation(Some(conv.clone()), &admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(require_member_or_admin(&conv, &admin).is_ok());

        let agent = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Agent);
        assert_eq!(require_member_or_admin(&conv, &agent).unwrap_err().code(), ErrorCode::NotConversationMember);
    }

    #[test]
    fn self_or_admin() {
        let tenant = Uuid::now_v7();
        let user = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Customer);
        assert!(require_self_or_admin(&user, user.id).is_ok());
        assert_eq!(require_self_or_admin(&user, Uuid::now_v7()).unwrap_err().kind(), ErrorKind::Permission);

        let admin = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Admin);
        assert!(require_self_or_admin(&admin, user.id).is_ok());
    }
}
