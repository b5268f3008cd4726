//! File lifecycle for profile documents: which uploads go where, which
//! objects become stale once the new document is stored.
//!
//! Order of operations for every write: validate and resolve targets, upload,
//! persist the document, then delete stale objects. A failed persist removes
//! the fresh uploads instead. Both deletions are best-effort.

use std::collections::HashSet;

use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::profile::models::ProfileDocument;
use crate::storage::{check_upload, delete_quietly, store_upload, FileKind, ObjectStore};
use crate::upload::{UploadForm, UploadedFile};

pub const STORAGE_SCOPE: &str = "profiles";

pub const CERTIFICATION_ID_FIELD: &str = "certification_id";
pub const CERTIFICATION_INDEX_FIELD: &str = "certification_index";

/// Multipart text fields that select targets rather than carry profile data.
pub const SELECTOR_FIELDS: &[&str] = &[CERTIFICATION_ID_FIELD, CERTIFICATION_INDEX_FIELD];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificationTarget {
    Id(Uuid),
    Index(usize),
}

#[derive(Debug, Default)]
pub struct ProfileUploads {
    pub avatar: Option<UploadedFile>,
    pub banner: Option<UploadedFile>,
    pub certificates: Vec<(CertificationTarget, UploadedFile)>,
}

impl ProfileUploads {
    /// Pulls the profile's file parts out of a multipart form.
    ///
    /// `certificate` files pair, in order, with either `certification_id` or
    /// `certification_index` text fields; the selector count must equal the
    /// file count.
    pub fn from_form(form: &mut UploadForm) -> Result<Self, AppError> {
        let avatar = form.take_file("avatar");
        let banner = form.take_file("banner");
        let files = form.take_files("certificate");

        let ids = form.texts(CERTIFICATION_ID_FIELD);
        let indexes = form.texts(CERTIFICATION_INDEX_FIELD);

        let targets: Vec<CertificationTarget> = if files.is_empty() {
            Vec::new()
        } else if ids.len() == files.len() && indexes.is_empty() {
            ids.iter()
                .map(|s| {
                    Uuid::parse_str(s.trim()).map(CertificationTarget::Id).map_err(|_| {
                        AppError::Validation(format!("{CERTIFICATION_ID_FIELD} '{s}' is not a UUID"))
                    })
                })
                .collect::<Result<_, _>>()?
        } else if indexes.len() == files.len() && ids.is_empty() {
            indexes
                .iter()
                .map(|s| {
                    s.trim().parse::<usize>().map(CertificationTarget::Index).map_err(|_| {
                        AppError::Validation(format!(
                            "{CERTIFICATION_INDEX_FIELD} '{s}' is not a non-negative integer"
                        ))
                    })
                })
                .collect::<Result<_, _>>()?
        } else {
            return Err(AppError::Validation(format!(
                "Each certificate file needs a matching {CERTIFICATION_ID_FIELD} or \
                 {CERTIFICATION_INDEX_FIELD} field ({} files, {} ids, {} indexes)",
                files.len(),
                ids.len(),
                indexes.len()
            )));
        };

        Ok(Self {
            avatar,
            banner,
            certificates: targets.into_iter().zip(files).collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.avatar.is_none() && self.banner.is_none() && self.certificates.is_empty()
    }
}

/// Uploads whose targets have been checked against a document.
#[derive(Debug, Default)]
pub struct ResolvedUploads {
    avatar: Option<UploadedFile>,
    banner: Option<UploadedFile>,
    /// (index into `certifications`, file)
    certificates: Vec<(usize, UploadedFile)>,
}

/// Checks every file and maps certificate targets to positions in `doc`.
/// Performs no I/O, so nothing is uploaded when the request is invalid.
pub fn resolve_uploads(
    doc: &ProfileDocument,
    uploads: ProfileUploads,
) -> Result<ResolvedUploads, AppError> {
    if let Some(f) = &uploads.avatar {
        check_upload(FileKind::Avatar, f)?;
    }
    if let Some(f) = &uploads.banner {
        check_upload(FileKind::Banner, f)?;
    }

    let mut seen = HashSet::new();
    let mut certificates = Vec::with_capacity(uploads.certificates.len());
    for (target, file) in uploads.certificates {
        check_upload(FileKind::Certificate, &file)?;
        let idx = match &target {
            CertificationTarget::Id(id) => doc.certifications.iter().position(|c| c.id == *id),
            CertificationTarget::Index(i) => (*i < doc.certifications.len()).then_some(*i),
        }
        .ok_or_else(|| {
            AppError::Validation(format!("No certification matches certificate target {target:?}"))
        })?;
        if !seen.insert(idx) {
            return Err(AppError::Validation(format!(
                "Only one certificate file may be attached to certifications[{idx}]"
            )));
        }
        certificates.push((idx, file));
    }

    Ok(ResolvedUploads {
        avatar: uploads.avatar,
        banner: uploads.banner,
        certificates,
    })
}

/// Uploads resolved files and points `doc` at them. If any upload fails, the
/// ones already stored by this call are removed and the error returned.
pub async fn apply_uploads(
    store: &dyn ObjectStore,
    user_id: Uuid,
    doc: &mut ProfileDocument,
    resolved: ResolvedUploads,
) -> Result<(), AppError> {
    let mut uploaded: Vec<String> = Vec::new();
    let result = upload_all(store, user_id, doc, resolved, &mut uploaded).await;
    if result.is_err() && !uploaded.is_empty() {
        warn!(
            "Profile upload for {user_id} failed midway; removing {} fresh objects",
            uploaded.len()
        );
        delete_quietly(store, &uploaded).await;
    }
    result
}

async fn upload_all(
    store: &dyn ObjectStore,
    user_id: Uuid,
    doc: &mut ProfileDocument,
    resolved: ResolvedUploads,
    uploaded: &mut Vec<String>,
) -> Result<(), AppError> {
    if let Some(file) = resolved.avatar {
        let stored = store_upload(store, STORAGE_SCOPE, user_id, FileKind::Avatar, &file).await?;
        uploaded.push(stored.key.clone());
        doc.avatar = Some(stored);
    }
    if let Some(file) = resolved.banner {
        let stored = store_upload(store, STORAGE_SCOPE, user_id, FileKind::Banner, &file).await?;
        uploaded.push(stored.key.clone());
        doc.banner = Some(stored);
    }
    for (idx, file) in resolved.certificates {
        let stored =
            store_upload(store, STORAGE_SCOPE, user_id, FileKind::Certificate, &file).await?;
        uploaded.push(stored.key.clone());
        doc.certifications[idx].certificate = Some(stored);
    }
    Ok(())
}

/// Keys referenced by `old` that `new` no longer references.
pub fn stale_keys(old: &ProfileDocument, new: &ProfileDocument) -> Vec<String> {
    let keep = new.file_keys();
    let mut stale: Vec<String> = old.file_keys().into_iter().filter(|k| !keep.contains(k)).collect();
    stale.sort();
    stale
}

/// Keys referenced by `new` that `old` did not reference.
pub fn fresh_keys(old: &ProfileDocument, new: &ProfileDocument) -> Vec<String> {
    stale_keys(new, old)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryObjectStore;
    use bytes::Bytes;
    use serde_json::json;

    fn upload(field: &str, name: &str, content_type: &str) -> UploadedFile {
        UploadedFile {
            field_name: field.to_string(),
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: Bytes::from_static(b"data"),
        }
    }

    fn doc_with_two_certs() -> ProfileDocument {
        serde_json::from_value(json!({
            "personal_information": {"first_name": "Ada", "last_name": "Lovelace"},
            "certifications": [
                {"name": "AWS SA", "issuing_organization": "AWS", "issue_date": "2023-01-01"},
                {"name": "CKA", "issuing_organization": "CNCF", "issue_date": "2022-05-01"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_from_form_pairs_by_index() {
        let mut form = UploadForm::new(
            vec![
                (CERTIFICATION_INDEX_FIELD.into(), "1".into()),
                (CERTIFICATION_INDEX_FIELD.into(), "0".into()),
            ],
            vec![
                upload("certificate", "cka.pdf", "application/pdf"),
                upload("certificate", "aws.pdf", "application/pdf"),
                upload("avatar", "me.png", "image/png"),
            ],
        );
        let uploads = ProfileUploads::from_form(&mut form).unwrap();
        assert!(uploads.avatar.is_some());
        assert_eq!(uploads.certificates[0].0, CertificationTarget::Index(1));
        assert_eq!(uploads.certificates[0].1.file_name, "cka.pdf");
        assert_eq!(uploads.certificates[1].0, CertificationTarget::Index(0));
    }

    #[test]
    fn test_from_form_requires_selector_per_file() {
        let mut form = UploadForm::new(
            vec![],
            vec![upload("certificate", "aws.pdf", "application/pdf")],
        );
        assert!(ProfileUploads::from_form(&mut form).is_err());
    }

    #[test]
    fn test_from_form_rejects_bad_uuid() {
        let mut form = UploadForm::new(
            vec![(CERTIFICATION_ID_FIELD.into(), "not-a-uuid".into())],
            vec![upload("certificate", "aws.pdf", "application/pdf")],
        );
        assert!(ProfileUploads::from_form(&mut form).is_err());
    }

    #[test]
    fn test_resolve_rejects_unknown_target() {
        let doc = doc_with_two_certs();
        let uploads = ProfileUploads {
            certificates: vec![(
                CertificationTarget::Id(Uuid::new_v4()),
                upload("certificate", "x.pdf", "application/pdf"),
            )],
            ..Default::default()
        };
        assert!(resolve_uploads(&doc, uploads).is_err());

        let uploads = ProfileUploads {
            certificates: vec![(
                CertificationTarget::Index(2),
                upload("certificate", "x.pdf", "application/pdf"),
            )],
            ..Default::default()
        };
        assert!(resolve_uploads(&doc, uploads).is_err());
    }

    #[test]
    fn test_resolve_rejects_two_files_for_one_certification() {
        let doc = doc_with_two_certs();
        let id = doc.certifications[0].id;
        let uploads = ProfileUploads {
            certificates: vec![
                (CertificationTarget::Id(id), upload("certificate", "a.pdf", "application/pdf")),
                (CertificationTarget::Index(0), upload("certificate", "b.pdf", "application/pdf")),
            ],
            ..Default::default()
        };
        assert!(resolve_uploads(&doc, uploads).is_err());
    }

    #[test]
    fn test_resolve_checks_content_type() {
        let doc = doc_with_two_certs();
        let uploads = ProfileUploads {
            avatar: Some(upload("avatar", "me.gif", "image/gif")),
            ..Default::default()
        };
        assert!(resolve_uploads(&doc, uploads).is_err());
    }

    #[tokio::test]
    async fn test_replacing_certificate_marks_old_file_stale() {
        let store = MemoryObjectStore::new();
        let user = Uuid::new_v4();
        let mut old = doc_with_two_certs();
        let first = resolve_uploads(
            &old,
            ProfileUploads {
                certificates: vec![(
                    CertificationTarget::Index(0),
                    upload("certificate", "v1.pdf", "application/pdf"),
                )],
                ..Default::default()
            },
        )
        .unwrap();
        apply_uploads(&store, user, &mut old, first).await.unwrap();
        let old_key = old.certifications[0].certificate.as_ref().unwrap().key.clone();

        let mut new = old.clone();
        let second = resolve_uploads(
            &new,
            ProfileUploads {
                certificates: vec![(
                    CertificationTarget::Id(new.certifications[0].id),
                    upload("certificate", "v2.pdf", "application/pdf"),
                )],
                ..Default::default()
            },
        )
        .unwrap();
        apply_uploads(&store, user, &mut new, second).await.unwrap();

        let new_key = new.certifications[0].certificate.as_ref().unwrap().key.clone();
        assert_ne!(old_key, new_key);
        assert_eq!(stale_keys(&old, &new), vec![old_key.clone()]);
        assert_eq!(fresh_keys(&old, &new), vec![new_key.clone()]);
        assert!(store.contains(&old_key));
        assert!(store.contains(&new_key));
        assert!(new.certifications[1].certificate.is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_objects() {
        let store = MemoryObjectStore::new();
        let mut doc = doc_with_two_certs();
        let resolved = resolve_uploads(
            &doc,
            ProfileUploads {
                avatar: Some(upload("avatar", "me.png", "image/png")),
                ..Default::default()
            },
        )
        .unwrap();
        store.fail_puts(true);
        let r = apply_uploads(&store, Uuid::new_v4(), &mut doc, resolved).await;
        assert!(matches!(r, Err(AppError::Storage(_))));
        assert_eq!(store.len(), 0);
        assert!(doc.avatar.is_none());
    }

    #[tokio::test]
    async fn test_failure_midway_removes_earlier_uploads() {
        let store = MemoryObjectStore::new();
        let mut doc = doc_with_two_certs();
        let before = doc.clone();
        let resolved = resolve_uploads(
            &doc,
            ProfileUploads {
                avatar: Some(upload("avatar", "me.png", "image/png")),
                banner: Some(upload("banner", "wide.png", "image/png")),
                certificates: vec![(
                    CertificationTarget::Index(1),
                    upload("certificate", "cka.pdf", "application/pdf"),
                )],
            },
        )
        .unwrap();
        store.fail_puts_after(2);

        let r = apply_uploads(&store, Uuid::new_v4(), &mut doc, resolved).await;
        assert!(matches!(r, Err(AppError::Storage(_))));
        assert_eq!(store.len(), 0);
        assert!(doc.certifications[1].certificate.is_none());
        assert_eq!(before.certifications, doc.certifications);
    }
}
