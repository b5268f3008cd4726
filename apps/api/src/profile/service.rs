//! Profile persistence and the create/edit/delete workflows that tie the
//! document to its stored files.

use std::future::Future;

use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::ProfileRow;
use crate::profile::assets::{
    apply_uploads, fresh_keys, resolve_uploads, stale_keys, ProfileUploads, STORAGE_SCOPE,
};
use crate::profile::merge::{document_from_fields, merge_profile, ProfilePatch};
use crate::profile::models::ProfileDocument;
use crate::profile::validation::validate_profile;
use crate::storage::{delete_quietly, store_upload, FileKind, ObjectStore};
use crate::upload::UploadedFile;

pub async fn find_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<ProfileRow>, AppError> {
    Ok(
        sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<ProfileRow, AppError> {
    find_profile(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile for user {user_id} not found")))
}

async fn insert_profile(
    pool: &PgPool,
    user_id: Uuid,
    doc: &ProfileDocument,
) -> Result<ProfileRow, AppError> {
    sqlx::query_as::<_, ProfileRow>(
        r#"
        INSERT INTO profiles (user_id, document)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(Json(doc))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Profile for user {user_id} already exists")))
}

/// Writes `doc` only if the stored row is still at `version`.
async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    doc: &ProfileDocument,
    version: i64,
) -> Result<ProfileRow, AppError> {
    let written = sqlx::query_as::<_, ProfileRow>(
        r#"
        UPDATE profiles SET document = $2, version = version + 1, updated_at = now()
        WHERE user_id = $1 AND version = $3
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(Json(doc))
    .bind(version)
    .fetch_optional(pool)
    .await?;

    match written {
        Some(row) => Ok(row),
        None if find_profile(pool, user_id).await?.is_some() => Err(AppError::Conflict(
            "Profile was changed by another request; reload and try again".to_string(),
        )),
        None => Err(AppError::NotFound(format!("Profile for user {user_id} not found"))),
    }
}

/// Awaits `write`, then deletes objects only `old` referenced. If the write
/// fails, objects only `new` references are removed instead.
async fn commit_files<T, W>(
    store: &dyn ObjectStore,
    old: Option<&ProfileDocument>,
    new: &ProfileDocument,
    write: W,
) -> Result<T, AppError>
where
    W: Future<Output = Result<T, AppError>>,
{
    let (stale, fresh) = match old {
        Some(old) => (stale_keys(old, new), fresh_keys(old, new)),
        None => (Vec::new(), new.file_keys().into_iter().collect()),
    };

    match write.await {
        Ok(written) => {
            delete_quietly(store, stale).await;
            Ok(written)
        }
        Err(e) => {
            delete_quietly(store, fresh).await;
            Err(e)
        }
    }
}

async fn commit_document(
    pool: &PgPool,
    store: &dyn ObjectStore,
    user_id: Uuid,
    old: Option<&ProfileRow>,
    new: &ProfileDocument,
) -> Result<ProfileRow, AppError> {
    match old {
        None => commit_files(store, None, new, insert_profile(pool, user_id, new)).await,
        Some(row) => {
            let write = update_profile(pool, user_id, new, row.version);
            commit_files(store, Some(&row.document.0), new, write).await
        }
    }
}

/// POST /profile/create workflow.
pub async fn create_profile(
    pool: &PgPool,
    store: &dyn ObjectStore,
    user_id: Uuid,
    fields: serde_json::Map<String, serde_json::Value>,
    uploads: ProfileUploads,
) -> Result<ProfileRow, AppError> {
    let mut doc = document_from_fields(fields)?;
    validate_profile(&doc)?;

    if find_profile(pool, user_id).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "Profile for user {user_id} already exists"
        )));
    }

    let resolved = resolve_uploads(&doc, uploads)?;
    apply_uploads(store, user_id, &mut doc, resolved).await?;

    let row = commit_document(pool, store, user_id, None, &doc).await?;
    info!("Created profile for user {user_id}");
    Ok(row)
}

/// PUT /profile/edit workflow.
pub async fn edit_profile(
    pool: &PgPool,
    store: &dyn ObjectStore,
    user_id: Uuid,
    fields: serde_json::Map<String, serde_json::Value>,
    uploads: ProfileUploads,
) -> Result<ProfileRow, AppError> {
    let existing = get_profile(pool, user_id).await?;

    let patch = ProfilePatch::from_fields(fields)?;
    let mut doc = merge_profile(&existing.document.0, patch)?;
    validate_profile(&doc)?;

    let resolved = resolve_uploads(&doc, uploads)?;
    apply_uploads(store, user_id, &mut doc, resolved).await?;

    let row = commit_document(pool, store, user_id, Some(&existing), &doc).await?;
    info!("Edited profile for user {user_id}");
    Ok(row)
}

/// Attaches `file` to certification `cert_id`, replacing any previous file.
pub async fn attach_certificate(
    pool: &PgPool,
    store: &dyn ObjectStore,
    user_id: Uuid,
    cert_id: Uuid,
    file: &UploadedFile,
) -> Result<ProfileRow, AppError> {
    let existing = get_profile(pool, user_id).await?;
    let mut doc = existing.document.0.clone();
    let cert = doc
        .certification_mut(cert_id)
        .ok_or_else(|| AppError::NotFound(format!("Certification {cert_id} not found")))?;

    let stored = store_upload(store, STORAGE_SCOPE, user_id, FileKind::Certificate, file).await?;
    cert.certificate = Some(stored);

    commit_document(pool, store, user_id, Some(&existing), &doc).await
}

/// Detaches and deletes the file of certification `cert_id`.
pub async fn detach_certificate(
    pool: &PgPool,
    store: &dyn ObjectStore,
    user_id: Uuid,
    cert_id: Uuid,
) -> Result<ProfileRow, AppError> {
    let existing = get_profile(pool, user_id).await?;
    let mut doc = existing.document.0.clone();
    let cert = doc
        .certification_mut(cert_id)
        .ok_or_else(|| AppError::NotFound(format!("Certification {cert_id} not found")))?;
    if cert.certificate.take().is_none() {
        return Err(AppError::NotFound(format!(
            "Certification {cert_id} has no certificate file"
        )));
    }

    commit_document(pool, store, user_id, Some(&existing), &doc).await
}

/// Hard-deletes the profile row, then its objects.
pub async fn delete_profile(
    pool: &PgPool,
    store: &dyn ObjectStore,
    user_id: Uuid,
) -> Result<(), AppError> {
    let row = sqlx::query_as::<_, ProfileRow>("DELETE FROM profiles WHERE user_id = $1 RETURNING *")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile for user {user_id} not found")))?;

    delete_quietly(store, row.document.0.file_keys()).await;
    info!("Deleted profile for user {user_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::fixtures;
    use crate::profile::assets::{CertificationTarget, ProfileUploads};
    use crate::storage::memory::MemoryObjectStore;
    use bytes::Bytes;
    use serde_json::{json, Map, Value};

    fn pdf(name: &str) -> UploadedFile {
        UploadedFile {
            field_name: "certificate".to_string(),
            file_name: name.to_string(),
            content_type: "application/pdf".to_string(),
            bytes: Bytes::from_static(b"%PDF"),
        }
    }

    fn png(field: &str) -> UploadedFile {
        UploadedFile {
            field_name: field.to_string(),
            file_name: "me.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: Bytes::from_static(b"png"),
        }
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    /// A document whose first certification already carries `v1.pdf`.
    async fn certified(store: &MemoryObjectStore, user: Uuid) -> ProfileDocument {
        let mut doc: ProfileDocument = serde_json::from_value(json!({
            "personal_information": {"first_name": "Ada", "last_name": "Lovelace"},
            "certifications": [
                {"name": "AWS SA", "issuing_organization": "AWS", "issue_date": "2023-01-01"}
            ]
        }))
        .unwrap();
        let uploads = ProfileUploads {
            certificates: vec![(CertificationTarget::Index(0), pdf("v1.pdf"))],
            ..Default::default()
        };
        let resolved = resolve_uploads(&doc, uploads).unwrap();
        apply_uploads(store, user, &mut doc, resolved).await.unwrap();
        doc
    }

    async fn replace_certificate(
        store: &MemoryObjectStore,
        user: Uuid,
        old: &ProfileDocument,
    ) -> ProfileDocument {
        let mut new = old.clone();
        let uploads = ProfileUploads {
            certificates: vec![(CertificationTarget::Id(old.certifications[0].id), pdf("v2.pdf"))],
            ..Default::default()
        };
        let resolved = resolve_uploads(&new, uploads).unwrap();
        apply_uploads(store, user, &mut new, resolved).await.unwrap();
        new
    }

    fn cert_key(doc: &ProfileDocument) -> String {
        doc.certifications[0].certificate.as_ref().unwrap().key.clone()
    }

    #[tokio::test]
    async fn test_new_certificate_file_replaces_old_object() {
        let store = MemoryObjectStore::new();
        let user = Uuid::new_v4();
        let old = certified(&store, user).await;
        let new = replace_certificate(&store, user, &old).await;

        commit_files(&store, Some(&old), &new, async { Ok(()) })
            .await
            .unwrap();

        assert!(!store.contains(&cert_key(&old)));
        assert!(store.contains(&cert_key(&new)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_removes_fresh_uploads_and_keeps_old() {
        let store = MemoryObjectStore::new();
        let user = Uuid::new_v4();
        let old = certified(&store, user).await;
        let new = replace_certificate(&store, user, &old).await;

        let r: Result<(), AppError> = commit_files(&store, Some(&old), &new, async {
            Err(AppError::Conflict("stale".to_string()))
        })
        .await;

        assert!(matches!(r, Err(AppError::Conflict(_))));
        assert!(store.contains(&cert_key(&old)));
        assert!(!store.contains(&cert_key(&new)));
    }

    #[tokio::test]
    async fn test_failed_insert_removes_every_upload() {
        let store = MemoryObjectStore::new();
        let doc = certified(&store, Uuid::new_v4()).await;
        let r: Result<(), AppError> = commit_files(&store, None, &doc, async {
            Err(AppError::Conflict("exists".to_string()))
        })
        .await;
        assert!(r.is_err());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    #[ignore] // requires postgres
    async fn test_concurrent_edits_never_reference_deleted_objects() {
        let pool = test_pool().await;
        let store = MemoryObjectStore::new();
        for _ in 0..10 {
            let user = fixtures::user(&pool).await;
            create_profile(
                &pool,
                &store,
                user,
                fields(json!({"personal_information": {"first_name": "Ada", "last_name": "L"}})),
                ProfileUploads {
                    avatar: Some(png("avatar")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

            let (avatar, headline) = tokio::join!(
                edit_profile(
                    &pool,
                    &store,
                    user,
                    Map::new(),
                    ProfileUploads {
                        avatar: Some(png("avatar")),
                        ..Default::default()
                    },
                ),
                edit_profile(
                    &pool,
                    &store,
                    user,
                    fields(json!({"personal_information": {"headline": "Engineer"}})),
                    ProfileUploads::default(),
                )
            );
            for r in [&avatar, &headline] {
                if let Err(e) = r {
                    assert!(matches!(e, AppError::Conflict(_)), "unexpected {e:?}");
                }
            }

            let stored = get_profile(&pool, user).await.unwrap();
            for key in stored.document.0.file_keys() {
                assert!(store.contains(&key), "profile references deleted object {key}");
            }
        }
    }
}
