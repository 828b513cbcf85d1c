use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};
use helpdesk_shared::types::api::ApiResponse;
use helpdesk_shared::types::auth::AuthUser;

use crate::models::{Attachment, Message, MessageEdit, MessageType, NewMessageInput};
use crate::storage::object_key;
use crate::AppState;

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked: u64,
}

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

// --- Handlers ---

/// GET /conversations/:id/messages - newest first, `before` pages further back
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let messages = state
        .messages
        .fetch_page(&auth_user, conversation_id, query.before, query.limit)?;
    Ok(Json(ApiResponse::ok(messages)))
}

/// POST /conversations/:id/messages - text only, files go through `/attachments`
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<NewMessageInput>,
) -> AppResult<Json<ApiResponse<Message>>> {
    // Storage paths are only ever produced by the upload route.
    if !req.attachments.is_empty() {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "attachments must be uploaded through /conversations/:id/attachments",
        ));
    }
    let message = state.messages.append(&auth_user, conversation_id, req)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// POST /conversations/:id/attachments - multipart `file` plus optional `caption` and `reply_to`
pub async fn send_attachment(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Message>>> {
    let storage = state
        .storage
        .clone()
        .ok_or_else(|| AppError::new(ErrorCode::ServiceUnavailable, "attachment storage is not configured"))?;

    // Fail before touching storage when the caller cannot post here.
    let conversation = state.conversations.get(&auth_user, conversation_id)?;
    crate::services::require_active(&conversation)?;

    let mut file: Option<(Vec<u8>, String, String)> = None; // (bytes, content_type, original name)
    let mut caption: Option<String> = None;
    let mut reply_to: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let original_name = field.file_name().unwrap_or("file").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((data.to_vec(), content_type, original_name));
            }
            "caption" => {
                let text = field.text().await.map_err(multipart_error)?;
                caption = Some(text).filter(|t| !t.trim().is_empty());
            }
            "reply_to" => {
                let text = field.text().await.map_err(multipart_error)?;
                let id = Uuid::parse_str(text.trim())
                    .map_err(|_| AppError::new(ErrorCode::ValidationError, "reply_to must be a uuid"))?;
                reply_to = Some(id);
            }
            _ => {}
        }
    }

    let (data, content_type, original_name) =
        file.ok_or_else(|| AppError::new(ErrorCode::ValidationError, "no file provided"))?;
    if data.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "file is empty"));
    }
    if data.len() > state.config.max_upload_bytes {
        return Err(AppError::new(
            ErrorCode::PayloadTooLarge,
            format!("file exceeds {} bytes", state.config.max_upload_bytes),
        ));
    }

    let message_type = if content_type.starts_with("image/") {
        MessageType::Image
    } else {
        MessageType::File
    };

    let key = object_key(auth_user.tenant_id, conversation_id, &original_name);
    let size = data.len() as i64;
    let stored = storage.store(&key, data, &content_type).await?;

    let attachment = Attachment {
        filename: key.rsplit('/').next().unwrap_or(&key).to_string(),
        original_name,
        mime_type: content_type,
        size,
        path: stored.path,
        thumbnail_path: stored.thumbnail_path,
    };
    let input = NewMessageInput {
        text: caption,
        message_type,
        attachments: vec![attachment],
        reply_to,
    };

    match state.messages.append(&auth_user, conversation_id, input) {
        Ok(message) => Ok(Json(ApiResponse::ok(message))),
        Err(e) => {
            if let Err(discard_err) = storage.discard(&key).await {
                tracing::warn!(key = %key, error = %discard_err, "failed to discard orphaned attachment");
            }
            Err(e)
        }
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(ErrorCode::PayloadTooLarge, "upload exceeds the size limit")
    } else {
        AppError::new(ErrorCode::ValidationError, format!("multipart error: {e}"))
    }
}

/// POST /conversations/:id/read - mark every message from others as read
pub async fn mark_as_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MarkedRead>>> {
    let marked = state.messages.mark_read(&auth_user, conversation_id)?;
    Ok(Json(ApiResponse::ok(MarkedRead { marked })))
}

/// GET /conversations/:id/unread-count
pub async fn conversation_unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let unread_count = state.messages.unread_count(&auth_user, conversation_id)?;
    Ok(Json(ApiResponse::ok(UnreadCount { unread_count })))
}

/// GET /unread-count - across all active conversations of the caller
pub async fn get_unread_count(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UnreadCount>>> {
    let unread_count = state.messages.total_unread(&auth_user)?;
    Ok(Json(ApiResponse::ok(UnreadCount { unread_count })))
}

/// GET /messages/search?q=
pub async fn search_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<Message>>>> {
    let found = state.messages.search(&auth_user, &query.q)?;
    Ok(Json(ApiResponse::ok(found)))
}

/// GET /messages/:id
pub async fn get_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = state.messages.get(&auth_user, id)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// PATCH /messages/:id - sender only
pub async fn edit_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MessageEdit>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = state.messages.edit(&auth_user, id, req)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// DELETE /messages/:id - sender or administrator, leaves a tombstone
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = state.messages.delete(&auth_user, id)?;
    Ok(Json(ApiResponse::ok_with_message(message, "message deleted")))
}

/// POST /messages/:id/reactions
pub async fn add_reaction(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReactionRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = state.messages.add_reaction(&auth_user, id, &req.emoji)?;
    Ok(Json(ApiResponse::ok(message)))
}

/// DELETE /messages/:id/reactions/:emoji
pub async fn remove_reaction(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, emoji)): Path<(Uuid, String)>,
) -> AppResult<Json<ApiResponse<Message>>> {
    let message = state.messages.remove_reaction(&auth_user, id, &emoji)?;
    Ok(Json(ApiResponse::ok(message)))
}
