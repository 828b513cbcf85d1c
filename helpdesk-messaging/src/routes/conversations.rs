use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use helpdesk_shared::errors::AppResult;
use helpdesk_shared::types::api::ApiResponse;
use helpdesk_shared::types::auth::AuthUser;
use helpdesk_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{Conversation, ConversationUpdate, NewGroup};
use crate::AppState;

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub partner_id: Option<Uuid>,
    pub is_muted: bool,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct DeletedConversation {
    pub id: Uuid,
    pub messages_removed: u64,
}

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct MuteRequest {
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

// --- Handlers ---

/// GET /conversations - active conversations of the caller, most recent activity first
pub async fn list_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<ConversationSummary>>>> {
    let page = state.conversations.list_for_user(&auth_user, &params)?;
    let now = Utc::now();

    let mut items = Vec::with_capacity(page.items.len());
    for conversation in page.items {
        let unread_count = state.messages.unread_count(&auth_user, conversation.id)?;
        items.push(ConversationSummary {
            partner_id: conversation.partner_of(auth_user.id),
            is_muted: conversation.is_muted_for(auth_user.id, now),
            unread_count,
            conversation,
        });
    }

    Ok(Json(ApiResponse::ok(Paginated {
        items,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
        total_pages: page.total_pages,
    })))
}

/// POST /conversations/direct - get or create the direct conversation with a user
pub async fn create_direct(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDirectRequest>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.create_direct(&auth_user, req.user_id)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// POST /conversations/group
pub async fn create_group(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewGroup>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.create_group(&auth_user, req)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// GET /conversations/search?q=
pub async fn search_conversations(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<Conversation>>>> {
    let found = state.conversations.search(&auth_user, &query.q)?;
    Ok(Json(ApiResponse::ok(found)))
}

/// GET /conversations/:id
pub async fn get_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.get(&auth_user, id)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// PATCH /conversations/:id - title and description only
pub async fn update_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConversationUpdate>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.update(&auth_user, id, req)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// DELETE /conversations/:id - archive, messages are kept
pub async fn archive_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.soft_delete(&auth_user, id)?;
    Ok(Json(ApiResponse::ok_with_message(conversation, "conversation archived")))
}

/// DELETE /conversations/:id/permanent - group conversations only
pub async fn delete_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DeletedConversation>>> {
    let messages_removed = state.conversations.hard_delete(&auth_user, id)?;
    Ok(Json(ApiResponse::ok(DeletedConversation { id, messages_removed })))
}

/// POST /conversations/:id/participants
pub async fn add_participant(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddParticipantRequest>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.add_participant(&auth_user, id, req.user_id)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// DELETE /conversations/:id/participants/:user_id - leave, or remove as an administrator
pub async fn remove_participant(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.remove_participant(&auth_user, id, user_id)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// PUT /conversations/:id/mute - body `{ "until": <timestamp> }`, omitted for indefinitely
pub async fn mute_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    req: Option<Json<MuteRequest>>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let until = req.and_then(|Json(r)| r.until);
    let conversation = state.conversations.mute(&auth_user, id, until)?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// DELETE /conversations/:id/mute
pub async fn unmute_conversation(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Conversation>>> {
    let conversation = state.conversations.unmute(&auth_user, id)?;
    Ok(Json(ApiResponse::ok(conversation)))
}
