use uuid::Uuid;

use helpdesk_shared::clients::minio::MinioClient;
use helpdesk_shared::errors::{AppError, AppResult};

const MAX_FILENAME_CHARS: usize = 100;

/// Where an uploaded attachment ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub path: String,
    pub thumbnail_path: Option<String>,
}

/// Blob storage for message attachments.
#[axum::async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn store(&self, key: &str, bytes: Vec<u8>, mime_type: &str) -> AppResult<StoredObject>;

    /// Remove an object whose message could not be persisted.
    async fn discard(&self, key: &str) -> AppResult<()>;
}

pub struct MinioAttachmentStorage {
    client: MinioClient,
}

impl MinioAttachmentStorage {
    pub fn new(client: MinioClient) -> Self {
        Self { client }
    }
}

#[axum::async_trait]
impl AttachmentStorage for MinioAttachmentStorage {
    async fn store(&self, key: &str, bytes: Vec<u8>, mime_type: &str) -> AppResult<StoredObject> {
        let path = self
            .client
            .upload(key, bytes, mime_type)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        // No thumbnailing backend is wired in.
        Ok(StoredObject { path, thumbnail_path: None })
    }

    async fn discard(&self, key: &str) -> AppResult<()> {
        self.client
            .delete(key)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
    }
}

/// `{tenant}/{conversation}/{uuid}-{filename}`; the uuid keeps keys unique.
pub fn object_key(tenant_id: Uuid, conversation_id: Uuid, original_name: &str) -> String {
    format!(
        "{tenant_id}/{conversation_id}/{}-{}",
        Uuid::now_v7(),
        sanitize_filename(original_name)
    )
}

pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_flattened() {
        assert_eq!(sanitize_filename("report 2024.pdf"), "report_2024.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\photo.png"), "photo.png");
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn keys_are_scoped_and_unique() {
        let (tenant, conv) = (Uuid::now_v7(), Uuid::now_v7());
        let first = object_key(tenant, conv, "a.png");
        let second = object_key(tenant, conv, "a.png");
        assert!(first.starts_with(&format!("{tenant}/{conv}/")));
        assert!(first.ends_with("-a.png"));
        assert_ne!(first, second);
    }
}
