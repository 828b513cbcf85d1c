pub mod conversation_service;
pub mod message_service;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Conversation;

pub const SEARCH_TERM_MAX_CHARS: usize = 100;

/// Trimmed search term, 1..=100 characters.
pub(crate) fn search_term(raw: &str) -> AppResult<&str> {
    let term = raw.trim();
    let len = term.chars().count();
    if len == 0 || len > SEARCH_TERM_MAX_CHARS {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("search term must be 1-{SEARCH_TERM_MAX_CHARS} characters"),
        ));
    }
    Ok(term)
}

pub(crate) fn require_active(conversation: &Conversation) -> AppResult<()> {
    if conversation.is_active {
        Ok(())
    } else {
        Err(crate::store::conversation_inactive())
    }
}
