pub mod conversations;
pub mod health;
pub mod messages;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Multipart framing on top of the file itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Conversations
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/direct", post(conversations::create_direct))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/search", get(conversations::search_conversations))
        .route(
            "/conversations/:id",
            get(conversations::get_conversation)
                .patch(conversations::update_conversation)
                .delete(conversations::archive_conversation),
        )
        .route("/conversations/:id/permanent", axum::routing::delete(conversations::delete_conversation))
        .route("/conversations/:id/participants", post(conversations::add_participant))
        .route(
            "/conversations/:id/participants/:user_id",
            axum::routing::delete(conversations::remove_participant),
        )
        .route(
            "/conversations/:id/mute",
            put(conversations::mute_conversation).delete(conversations::unmute_conversation),
        )
        // Messages
        .route(
            "/conversations/:id/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/conversations/:id/attachments",
            post(messages::send_attachment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/conversations/:id/read", post(messages::mark_as_read))
        .route("/conversations/:id/unread-count", get(messages::conversation_unread_count))
        .route("/unread-count", get(messages::get_unread_count))
        .route("/messages/search", get(messages::search_messages))
        .route(
            "/messages/:id",
            get(messages::get_message)
                .patch(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route("/messages/:id/reactions", post(messages::add_reaction))
        .route("/messages/:id/reactions/:emoji", axum::routing::delete(messages::remove_reaction))
        .layer(axum::middleware::from_fn(helpdesk_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use helpdesk_shared::middleware::{jwt_secret, sign_jwt};
    use helpdesk_shared::types::auth::{AuthUser, Claims, UserRole};

    use crate::config::AppConfig;
    use crate::realtime::RealtimeHub;
    use crate::storage::testing::MemoryStorage;
    use crate::storage::AttachmentStorage;
    use crate::store::{MemoryStore, Store};

    struct TestApp {
        router: Router,
        tenant: Uuid,
    }

    impl TestApp {
        fn new(storage: Option<Arc<dyn AttachmentStorage>>) -> Self {
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let state = AppState::new(AppConfig::default(), store, RealtimeHub::new(), None, storage, None);
            Self {
                router: router(Arc::new(state)),
                tenant: Uuid::now_v7(),
            }
        }

        fn user(&self, role: UserRole) -> AuthUser {
            AuthUser::new(Uuid::now_v7(), self.tenant, role)
        }

        async fn call(&self, method: &str, uri: &str, user: Option<&AuthUser>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(request).await
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn direct(&self, a: &AuthUser, b: &AuthUser) -> String {
            let (status, body) = self
                .call("POST", "/conversations/direct", Some(a), Some(json!({ "user_id": b.id })))
                .await;
            assert_eq!(status, StatusCode::OK);
            body["data"]["id"].as_str().unwrap().to_string()
        }
    }

    fn token(user: &AuthUser) -> String {
        let claims = Claims::new(user.id, user.tenant_id, user.role, 300);
        sign_jwt(&claims, &jwt_secret()).unwrap()
    }

    fn multipart_body(boundary: &str, filename: &str, content_type: &str, bytes: &[u8], caption: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"caption\"\r\n\r\n{caption}\r\n\
                 --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn health_reports_store() {
        let app = TestApp::new(None);
        let (status, body) = app.call("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"][0]["name"], "store");
    }

    #[tokio::test]
    async fn requests_need_a_session() {
        let app = TestApp::new(None);
        let (status, body) = app.call("GET", "/conversations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn direct_creation_returns_existing_conversation() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));

        let first = app.direct(&agent, &customer).await;
        let second = app.direct(&customer, &agent).await;
        assert_eq!(first, second);

        let (status, body) = app.call("GET", "/conversations", Some(&customer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["partner_id"], json!(agent.id));
        assert_eq!(body["data"]["items"][0]["unread_count"], 0);
    }

    #[tokio::test]
    async fn other_tenant_sees_not_found() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        let outsider = AuthUser::new(agent.id, Uuid::now_v7(), UserRole::Admin);
        let (status, body) = app.call("GET", &format!("/conversations/{id}"), Some(&outsider), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E4001");

        let (missing, _) = app
            .call("GET", &format!("/conversations/{}", Uuid::now_v7()), Some(&agent), None)
            .await;
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn message_flow_tracks_unread() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        let (status, body) = app
            .call("POST", &format!("/conversations/{id}/messages"), Some(&customer), Some(json!({ "text": "my printer is on fire" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "sent");

        let (_, body) = app.call("GET", &format!("/conversations/{id}/unread-count"), Some(&agent), None).await;
        assert_eq!(body["data"]["unread_count"], 1);
        let (_, body) = app.call("GET", "/unread-count", Some(&agent), None).await;
        assert_eq!(body["data"]["unread_count"], 1);

        let (_, body) = app.call("POST", &format!("/conversations/{id}/read"), Some(&agent), None).await;
        assert_eq!(body["data"]["marked"], 1);
        let (_, body) = app.call("GET", "/unread-count", Some(&agent), None).await;
        assert_eq!(body["data"]["unread_count"], 0);

        let (status, body) = app.call("GET", &format!("/conversations/{id}/messages?limit=10"), Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["read_by"][0]["user_id"], json!(agent.id));
    }

    #[tokio::test]
    async fn edit_and_delete_follow_ownership() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;
        let (_, body) = app
            .call("POST", &format!("/conversations/{id}/messages"), Some(&customer), Some(json!({ "text": "hello" })))
            .await;
        let message_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call("PATCH", &format!("/messages/{message_id}"), Some(&agent), Some(json!({ "text": "hijacked" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "E4010");

        let (status, body) = app
            .call("PATCH", &format!("/messages/{message_id}"), Some(&customer), Some(json!({ "text": "hello there" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_edited"], true);

        let (status, body) = app.call("DELETE", &format!("/messages/{message_id}"), Some(&customer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_deleted"], true);
        assert_eq!(body["data"]["text"], crate::models::TOMBSTONE_TEXT);

        let (status, _) = app
            .call("PATCH", &format!("/messages/{message_id}"), Some(&customer), Some(json!({ "text": "again" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn reactions_by_path_emoji() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;
        let (_, body) = app
            .call("POST", &format!("/conversations/{id}/messages"), Some(&customer), Some(json!({ "text": "fixed?" })))
            .await;
        let message_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call("POST", &format!("/messages/{message_id}/reactions"), Some(&agent), Some(json!({ "emoji": "👍" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reactions"][0]["count"], 1);

        // 👍 percent-encoded
        let (status, body) = app
            .call("DELETE", &format!("/messages/{message_id}/reactions/%F0%9F%91%8D"), Some(&agent), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reactions"], json!([]));
    }

    #[tokio::test]
    async fn group_lifecycle() {
        let app = TestApp::new(None);
        let agent = app.user(UserRole::Agent);
        let (a, b, c) = (app.user(UserRole::Customer), app.user(UserRole::Customer), app.user(UserRole::Agent));

        let (status, body) = app
            .call(
                "POST",
                "/conversations/group",
                Some(&agent),
                Some(json!({ "title": "Escalations", "participant_ids": [a.id, b.id] })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_group"], true);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call("POST", &format!("/conversations/{id}/participants"), Some(&agent), Some(json!({ "user_id": c.id })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["participants"].as_array().unwrap().len(), 4);

        let (status, body) = app
            .call("PATCH", &format!("/conversations/{id}"), Some(&a), Some(json!({ "title": "Escalations (EU)" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Escalations (EU)");

        let (status, _) = app.call("GET", "/conversations/search?q=eu", Some(&b), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call("DELETE", &format!("/conversations/{id}/permanent"), Some(&a), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call("DELETE", &format!("/conversations/{id}/permanent"), Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], json!(id));

        let (status, _) = app.call("GET", &format!("/conversations/{id}"), Some(&agent), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mute_without_body_is_indefinite() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        let (status, _) = app.call("PUT", &format!("/conversations/{id}/mute"), Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.call("GET", "/conversations", Some(&agent), None).await;
        assert_eq!(body["data"]["items"][0]["is_muted"], true);

        let (status, _) = app.call("DELETE", &format!("/conversations/{id}/mute"), Some(&agent), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.call("GET", "/conversations", Some(&agent), None).await;
        assert_eq!(body["data"]["items"][0]["is_muted"], false);
    }

    #[tokio::test]
    async fn attachments_need_storage() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        let boundary = "helpdesk-boundary";
        let request = Request::builder()
            .method("POST")
            .uri(format!("/conversations/{id}/attachments"))
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&customer)))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(multipart_body(boundary, "log.txt", "text/plain", b"stack trace", "")))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "E0007");
    }

    #[tokio::test]
    async fn image_upload_becomes_image_message() {
        let storage = Arc::new(MemoryStorage::default());
        let app = TestApp::new(Some(storage.clone()));
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        let boundary = "helpdesk-boundary";
        let request = Request::builder()
            .method("POST")
            .uri(format!("/conversations/{id}/attachments"))
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&customer)))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(multipart_body(boundary, "screen shot.png", "image/png", b"\x89PNG....", "see this")))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);

        let message = &body["data"];
        assert_eq!(message["message_type"], "image");
        assert_eq!(message["text"], "see this");
        assert_eq!(message["attachments"][0]["original_name"], "screen shot.png");
        assert_eq!(message["attachments"][0]["mime_type"], "image/png");
        assert_eq!(message["attachments"][0]["size"], 8);
        assert!(message["attachments"][0]["thumbnail_path"].as_str().unwrap().starts_with("thumbs/"));
        assert_eq!(storage.objects.len(), 1);
    }

    #[tokio::test]
    async fn failed_append_discards_upload() {
        let storage = Arc::new(MemoryStorage::default());
        let app = TestApp::new(Some(storage.clone()));
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        // A reply to a message that does not exist is rejected after the upload.
        let boundary = "helpdesk-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"reply_to\"\r\n\r\n{}\r\n",
            Uuid::now_v7()
        )
        .into_bytes();
        body.extend(multipart_body(boundary, "a.pdf", "application/pdf", b"%PDF", ""));
        let request = Request::builder()
            .method("POST")
            .uri(format!("/conversations/{id}/attachments"))
            .header(header::AUTHORIZATION, format!("Bearer {}", token(&customer)))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let (status, _) = app.send(request).await;
        assert!(status.is_client_error());
        assert!(storage.objects.is_empty());
    }

    #[tokio::test]
    async fn json_messages_cannot_name_storage_paths() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        let id = app.direct(&agent, &customer).await;

        let body = json!({
            "message_type": "file",
            "attachments": [{
                "filename": "secret.pdf",
                "original_name": "secret.pdf",
                "mime_type": "application/pdf",
                "size": 1024,
                "path": format!("{}/payroll/secret.pdf", Uuid::now_v7()),
                "thumbnail_path": null
            }]
        });
        let (status, body) = app
            .call("POST", &format!("/conversations/{id}/messages"), Some(&customer), Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "E0002");

        let (_, body) = app.call("GET", &format!("/conversations/{id}/messages"), Some(&agent), None).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let app = TestApp::new(None);
        let (agent, customer) = (app.user(UserRole::Agent), app.user(UserRole::Customer));
        app.direct(&agent, &customer).await;

        let (status, body) = app
            .call("GET", &format!("/conversations?page={}", u64::MAX), Some(&agent), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["items"], json!([]));
        assert_eq!(body["data"]["total"], 1);
    }
}
