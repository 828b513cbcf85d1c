use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use socketioxide::extract::{Data, SocketRef};
use tokio::sync::mpsc;
use uuid::Uuid;

use helpdesk_shared::errors::{AppError, AppResult, ErrorCode};
use helpdesk_shared::middleware::{jwt_secret, validate_jwt};
use helpdesk_shared::types::auth::AuthUser;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorPayload {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code().code().to_string(),
            message: err.to_string(),
        }
    }
}

fn get_user(socket: &SocketRef) -> Option<AuthUser> {
    socket.extensions.get::<AuthUser>()
}

fn emit_error(socket: &SocketRef, err: &AppError) {
    let _ = socket.emit("error", &ErrorPayload::from(err));
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let query = socket.req_parts().uri.query().unwrap_or_default();
    let user = match authenticate_query(query) {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(error = %err, "messaging socket auth failed");
            emit_error(&socket, &err);
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user.clone());

    // Everything the hub delivers to this connection is drained onto the socket.
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.hub.register(socket.id.to_string(), tx);
    tokio::spawn({
        let socket = socket.clone();
        async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = socket.emit(event.kind.as_str(), &event) {
                    tracing::debug!(sid = %socket.id, error = %e, "realtime forward stopped");
                    break;
                }
            }
        }
    });

    tracing::info!(user_id = %user.id, tenant_id = %user.tenant_id, sid = %socket.id, "messaging socket connected");
    let _ = socket.emit("connected", &serde_json::json!({ "userId": user.id }));

    socket.on("join", {
        let state = state.clone();
        move |socket: SocketRef, Data::<Value>(payload)| {
            let state = state.clone();
            async move { on_join(socket, payload, &state) }
        }
    });

    socket.on("leave", {
        let state = state.clone();
        move |socket: SocketRef, Data::<Value>(payload)| {
            let state = state.clone();
            async move { on_leave(socket, payload, &state) }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                state.hub.disconnect(&socket.id.to_string());
                if let Some(user) = get_user(&socket) {
                    tracing::info!(user_id = %user.id, sid = %socket.id, "messaging socket disconnected");
                }
            }
        }
    });
}

fn on_join(socket: SocketRef, payload: Value, state: &Arc<AppState>) {
    let Some(user) = get_user(&socket) else {
        return;
    };
    let result = conversation_id(&payload)
        .and_then(|id| join_conversation(state, &socket.id.to_string(), &user, id).map(|_| id));

    match result {
        Ok(id) => {
            let _ = socket.emit("joined", &serde_json::json!({ "conversationId": id }));
        }
        Err(err) => {
            tracing::debug!(user_id = %user.id, error = %err, "join refused");
            emit_error(&socket, &err);
        }
    }
}

fn on_leave(socket: SocketRef, payload: Value, state: &Arc<AppState>) {
    match conversation_id(&payload) {
        Ok(id) => {
            state.hub.unsubscribe(&socket.id.to_string(), id);
            let _ = socket.emit("left", &serde_json::json!({ "conversationId": id }));
        }
        Err(err) => emit_error(&socket, &err),
    }
}

/// Subscribe a connection to a conversation the user currently belongs to,
/// and mark what is waiting for them as delivered.
pub fn join_conversation(state: &AppState, connection: &str, user: &AuthUser, conversation_id: Uuid) -> AppResult<()> {
    state.conversations.get(user, conversation_id)?;
    if !state.hub.subscribe(connection, conversation_id) {
        return Err(AppError::invalid_state("connection is not registered"));
    }
    if let Err(e) = state.messages.mark_delivered(user, conversation_id) {
        tracing::warn!(conversation_id = %conversation_id, error = %e, "failed to mark delivered on join");
    }
    Ok(())
}

/// Accepts either a bare id or `{ "conversationId": id }`.
fn conversation_id(payload: &Value) -> AppResult<Uuid> {
    let raw = match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("conversationId")
            .or_else(|| map.get("conversation_id"))
            .and_then(Value::as_str),
        _ => None,
    };
    raw.and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "conversationId must be a uuid"))
}

/// Same secret the HTTP extractor verifies against.
fn authenticate_query(query: &str) -> AppResult<AuthUser> {
    let token = token_from_query(query)
        .ok_or_else(|| AppError::unauthorized("missing token query parameter"))?;
    let claims = validate_jwt(token, &jwt_secret())?;
    Ok(AuthUser::from(claims))
}

fn token_from_query(query: &str) -> Option<&str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token" && !value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::NewMessageInput;
    use crate::realtime::{EventKind, RealtimeHub};
    use crate::store::{MemoryStore, Store};
    use helpdesk_shared::errors::ErrorKind;
    use helpdesk_shared::middleware::sign_jwt;
    use helpdesk_shared::types::auth::{Claims, UserRole};

    fn state() -> AppState {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        AppState::new(AppConfig::default(), store, RealtimeHub::new(), None, None, None)
    }

    #[test]
    fn token_is_read_from_query() {
        assert_eq!(token_from_query("EIO=4&transport=websocket&token=abc.def"), Some("abc.def"));
        assert_eq!(token_from_query("token=&EIO=4"), None);
        assert_eq!(token_from_query("EIO=4"), None);
    }

    #[test]
    fn handshake_accepts_what_http_accepts() {
        let tenant = Uuid::now_v7();
        let claims = Claims::new(Uuid::now_v7(), tenant, UserRole::Agent, 300);
        let token = sign_jwt(&claims, &jwt_secret()).unwrap();

        let user = authenticate_query(&format!("EIO=4&token={token}")).unwrap();
        assert_eq!(user.id, claims.sub);
        assert_eq!(user.tenant_id, tenant);

        let forged = sign_jwt(&claims, "some-other-secret").unwrap();
        let err = authenticate_query(&format!("token={forged}")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(authenticate_query("EIO=4").unwrap_err().kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn join_payload_shapes() {
        let id = Uuid::now_v7();
        assert_eq!(conversation_id(&Value::String(id.to_string())).unwrap(), id);
        assert_eq!(conversation_id(&serde_json::json!({ "conversationId": id })).unwrap(), id);
        assert_eq!(conversation_id(&serde_json::json!({ "conversation_id": id })).unwrap(), id);
        assert_eq!(conversation_id(&serde_json::json!(42)).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn only_members_can_join() {
        let state = state();
        let tenant = Uuid::now_v7();
        let agent = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Agent);
        let customer = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Customer);
        let stranger = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Admin);
        let conversation = state.conversations.create_direct(&agent, customer.id).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        state.hub.register("sid-stranger", tx);
        let err = join_conversation(&state, "sid-stranger", &stranger, conversation.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotConversationMember);
        assert_eq!(state.hub.subscriber_count(conversation.id), 0);
    }

    #[test]
    fn joined_connection_receives_events_and_marks_delivered() {
        let state = state();
        let tenant = Uuid::now_v7();
        let agent = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Agent);
        let customer = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Customer);
        let conversation = state.conversations.create_direct(&agent, customer.id).unwrap();

        let waiting = state
            .messages
            .append(&customer, conversation.id, NewMessageInput { text: Some("anyone there?".into()), ..Default::default() })
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        state.hub.register("sid-agent", tx);
        join_conversation(&state, "sid-agent", &agent, conversation.id).unwrap();
        assert_eq!(state.hub.subscriber_count(conversation.id), 1);

        let delivered = state.messages.get(&agent, waiting.id).unwrap();
        assert_eq!(delivered.status, crate::models::DeliveryStatus::Delivered);

        state
            .messages
            .append(&customer, conversation.id, NewMessageInput { text: Some("hello?".into()), ..Default::default() })
            .unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::NewMessage);
        assert_eq!(event.conversation_id, conversation.id);

        state.hub.disconnect("sid-agent");
        assert_eq!(state.hub.subscriber_count(conversation.id), 0);
    }

    #[test]
    fn unregistered_connection_cannot_join() {
        let state = state();
        let tenant = Uuid::now_v7();
        let agent = AuthUser::new(Uuid::now_v7(), tenant, UserRole::Agent);
        let conversation = state.conversations.create_direct(&agent, Uuid::now_v7()).unwrap();

        let err = join_conversation(&state, "sid-gone", &agent, conversation.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
