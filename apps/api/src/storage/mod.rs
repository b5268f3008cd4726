//! Object storage for user-uploaded assets (avatars, banners, certificates,
//! business logos, application resumes).
//!
//! Handlers never talk to S3 directly: `AppState` carries an
//! `Arc<dyn ObjectStore>` so tests can swap in the in-memory store.

pub mod s3;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::upload::UploadedFile;

const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];
const DOCUMENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "application/pdf"];

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    fn public_url(&self, key: &str) -> String;
}

/// Metadata of an object owned by a document. Only the server creates these;
/// client-supplied copies are discarded before merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub key: String,
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Avatar,
    Banner,
    Certificate,
    Logo,
    Resume,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Avatar => "avatar",
            FileKind::Banner => "banner",
            FileKind::Certificate => "certificate",
            FileKind::Logo => "logo",
            FileKind::Resume => "resume",
        }
    }

    pub fn allowed_content_types(&self) -> &'static [&'static str] {
        match self {
            FileKind::Avatar | FileKind::Banner | FileKind::Logo => IMAGE_TYPES,
            FileKind::Certificate | FileKind::Resume => DOCUMENT_TYPES,
        }
    }
}

/// Rejects empty files and content types the kind does not accept.
pub fn check_upload(kind: FileKind, file: &UploadedFile) -> Result<(), AppError> {
    if file.bytes.is_empty() {
        return Err(AppError::Validation(format!(
            "{} file '{}' is empty",
            kind.as_str(),
            file.file_name
        )));
    }
    let allowed = kind.allowed_content_types();
    if !allowed.contains(&file.content_type.as_str()) {
        return Err(AppError::Validation(format!(
            "{} must be one of [{}], got '{}'",
            kind.as_str(),
            allowed.join(", "),
            file.content_type
        )));
    }
    Ok(())
}

/// `{scope}/{owner_id}/{kind}/{uuid}-{file_name}` with the file name reduced
/// to a safe character set.
pub fn object_key(scope: &str, owner_id: Uuid, kind: FileKind, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}-{}",
        scope,
        owner_id,
        kind.as_str(),
        Uuid::new_v4(),
        sanitize_file_name(file_name)
    )
}

pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

/// Validates and uploads a file, returning the metadata to embed in a document.
pub async fn store_upload(
    store: &dyn ObjectStore,
    scope: &str,
    owner_id: Uuid,
    kind: FileKind,
    file: &UploadedFile,
) -> Result<StoredFile, AppError> {
    check_upload(kind, file)?;
    let key = object_key(scope, owner_id, kind, &file.file_name);
    store
        .put(&key, file.bytes.clone(), &file.content_type)
        .await
        .map_err(|e| AppError::Storage(format!("upload of '{key}' failed: {e}")))?;
    info!("Stored {} object {key} ({} bytes)", kind.as_str(), file.bytes.len());

    Ok(StoredFile {
        url: store.public_url(&key),
        key,
        file_name: file.file_name.clone(),
        content_type: file.content_type.clone(),
        size_bytes: file.bytes.len() as u64,
        uploaded_at: Utc::now(),
    })
}

/// Deletes objects without failing the caller; failures are only logged.
pub async fn delete_quietly<I, S>(store: &dyn ObjectStore, keys: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for key in keys {
        let key = key.as_ref();
        match store.delete(key).await {
            Ok(()) => info!("Deleted stale object {key}"),
            Err(e) => warn!("Failed to delete stale object {key}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryObjectStore;

    fn upload(name: &str, content_type: &str, body: &'static [u8]) -> UploadedFile {
        UploadedFile {
            field_name: "file".to_string(),
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_sanitize_strips_paths_and_symbols() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\my cert (1).pdf"), "my_cert__1_.pdf");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn test_object_key_layout() {
        let owner = Uuid::new_v4();
        let key = object_key("profiles", owner, FileKind::Avatar, "me.png");
        assert!(key.starts_with(&format!("profiles/{owner}/avatar/")));
        assert!(key.ends_with("-me.png"));
    }

    #[test]
    fn test_check_upload_rejects_pdf_avatar() {
        let file = upload("cv.pdf", "application/pdf", b"%PDF");
        assert!(check_upload(FileKind::Avatar, &file).is_err());
        assert!(check_upload(FileKind::Certificate, &file).is_ok());
    }

    #[test]
    fn test_check_upload_rejects_empty() {
        let file = upload("empty.png", "image/png", b"");
        assert!(matches!(
            check_upload(FileKind::Banner, &file),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_store_upload_puts_object() {
        let store = MemoryObjectStore::new();
        let owner = Uuid::new_v4();
        let stored = store_upload(
            &store,
            "profiles",
            owner,
            FileKind::Certificate,
            &upload("aws.pdf", "application/pdf", b"%PDF-1.7"),
        )
        .await
        .unwrap();
        assert!(store.contains(&stored.key));
        assert_eq!(stored.size_bytes, 8);
        assert!(stored.url.ends_with(&stored.key));
    }

    #[tokio::test]
    async fn test_delete_quietly_swallows_failures() {
        let store = MemoryObjectStore::new();
        store.fail_deletes(true);
        store
            .put("a/b", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        delete_quietly(&store, ["a/b"]).await;
        assert!(store.contains("a/b"));
    }
}
