//! Partial updates of the profile document.
//!
//! Objects merge key by key (a `null` removes the key), every other value,
//! arrays included, replaces what was there. File metadata is owned by the
//! server: client copies are stripped, and certifications that survive an
//! edit keep the file they had unless the patch nulls it explicitly.

use std::collections::HashSet;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::patch::{merge_value, take_flag};
use crate::profile::models::ProfileDocument;
use crate::validation::from_json;

const REMOVE_AVATAR: &str = "remove_avatar";
const REMOVE_BANNER: &str = "remove_banner";

/// A client patch with the server-managed parts separated out.
#[derive(Debug, Default)]
pub struct ProfilePatch {
    pub fields: Map<String, Value>,
    pub remove_avatar: bool,
    pub remove_banner: bool,
    /// Certifications whose patch entry carried `"certificate": null`.
    pub cleared_certificates: HashSet<Uuid>,
}

impl ProfilePatch {
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self, AppError> {
        let remove_avatar = take_flag(&mut fields, REMOVE_AVATAR)?;
        let remove_banner = take_flag(&mut fields, REMOVE_BANNER)?;
        fields.remove("avatar");
        fields.remove("banner");

        let mut cleared_certificates = HashSet::new();
        if let Some(Value::Array(certs)) = fields.get_mut("certifications") {
            for cert in certs.iter_mut() {
                let Value::Object(obj) = cert else { continue };
                if let Some(previous) = obj.remove("certificate") {
                    if previous.is_null() {
                        if let Some(id) = obj
                            .get("id")
                            .and_then(Value::as_str)
                            .and_then(|s| Uuid::parse_str(s).ok())
                        {
                            cleared_certificates.insert(id);
                        }
                    }
                }
            }
        }

        Ok(Self {
            fields,
            remove_avatar,
            remove_banner,
            cleared_certificates,
        })
    }
}

/// Builds a brand-new document from create fields. Client file objects are ignored.
pub fn document_from_fields(fields: Map<String, Value>) -> Result<ProfileDocument, AppError> {
    if !fields.contains_key("personal_information") {
        return Err(AppError::Validation(
            "personal_information is required".to_string(),
        ));
    }
    let patch = ProfilePatch::from_fields(fields)?;
    from_json("profile", Value::Object(patch.fields))
}

/// Applies `patch` on top of `existing`, returning the merged document.
pub fn merge_profile(
    existing: &ProfileDocument,
    patch: ProfilePatch,
) -> Result<ProfileDocument, AppError> {
    let mut base = serde_json::to_value(existing).map_err(anyhow::Error::from)?;
    if let Value::Object(obj) = &mut base {
        if patch.remove_avatar {
            obj.remove("avatar");
        }
        if patch.remove_banner {
            obj.remove("banner");
        }
    }

    merge_value(&mut base, Value::Object(patch.fields));
    let mut merged: ProfileDocument = from_json("profile", base)?;

    for cert in merged.certifications.iter_mut() {
        if patch.cleared_certificates.contains(&cert.id) {
            cert.certificate = None;
            continue;
        }
        if cert.certificate.is_none() {
            cert.certificate = existing
                .certifications
                .iter()
                .find(|c| c.id == cert.id)
                .and_then(|c| c.certificate.clone());
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoredFile;
    use chrono::Utc;
    use serde_json::json;

    fn file(key: &str) -> StoredFile {
        StoredFile {
            key: key.to_string(),
            url: format!("memory://bucket/{key}"),
            file_name: "f.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size_bytes: 4,
            uploaded_at: Utc::now(),
        }
    }

    fn existing() -> ProfileDocument {
        let mut doc: ProfileDocument = serde_json::from_value(json!({
            "personal_information": {
                "first_name": "Ada", "last_name": "Lovelace", "headline": "Engineer"
            },
            "skills": [{"name": "Rust", "level": "expert"}],
            "certifications": [
                {"name": "AWS SA", "issuing_organization": "AWS", "issue_date": "2023-01-01"},
                {"name": "CKA", "issuing_organization": "CNCF", "issue_date": "2022-05-01"}
            ]
        }))
        .unwrap();
        doc.certifications[0].certificate = Some(file("profiles/u/certificate/aws.pdf"));
        doc.certifications[1].certificate = Some(file("profiles/u/certificate/cka.pdf"));
        doc.avatar = Some(file("profiles/u/avatar/me.png"));
        doc
    }

    fn patch(v: Value) -> ProfilePatch {
        match v {
            Value::Object(map) => ProfilePatch::from_fields(map).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_nested_field_merge_keeps_siblings() {
        let base = existing();
        let merged = merge_profile(
            &base,
            patch(json!({"personal_information": {"headline": "Principal Engineer"}})),
        )
        .unwrap();
        assert_eq!(merged.personal_information.first_name, "Ada");
        assert_eq!(
            merged.personal_information.headline.as_deref(),
            Some("Principal Engineer")
        );
        assert_eq!(merged.skills, base.skills);
        assert_eq!(merged.file_keys(), base.file_keys());
    }

    #[test]
    fn test_null_removes_optional_field() {
        let merged = merge_profile(
            &existing(),
            patch(json!({"personal_information": {"headline": null}})),
        )
        .unwrap();
        assert!(merged.personal_information.headline.is_none());
    }

    #[test]
    fn test_removing_required_section_fails() {
        let r = merge_profile(&existing(), patch(json!({"personal_information": null})));
        assert!(matches!(r, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_arrays_replace() {
        let merged = merge_profile(
            &existing(),
            patch(json!({"skills": [{"name": "Go", "level": "advanced"}]})),
        )
        .unwrap();
        assert_eq!(merged.skills.len(), 1);
        assert_eq!(merged.skills[0].name, "Go");
    }

    #[test]
    fn test_certificate_carried_over_by_id() {
        let base = existing();
        let aws = &base.certifications[0];
        let merged = merge_profile(
            &base,
            patch(json!({"certifications": [{
                "id": aws.id, "name": "AWS Solutions Architect",
                "issuing_organization": "AWS", "issue_date": "2023-01-01"
            }]})),
        )
        .unwrap();
        assert_eq!(merged.certifications.len(), 1);
        assert_eq!(merged.certifications[0].name, "AWS Solutions Architect");
        assert_eq!(merged.certifications[0].certificate, aws.certificate);
        // The CKA entry was dropped, so its file is no longer referenced.
        assert!(!merged.file_keys().contains("profiles/u/certificate/cka.pdf"));
    }

    #[test]
    fn test_null_certificate_detaches_file() {
        let base = existing();
        let cka = &base.certifications[1];
        let merged = merge_profile(
            &base,
            patch(json!({"certifications": [
                serde_json::to_value(&base.certifications[0]).unwrap(),
                {"id": cka.id, "name": "CKA", "issuing_organization": "CNCF",
                 "issue_date": "2022-05-01", "certificate": null}
            ]})),
        )
        .unwrap();
        assert!(merged.certifications[0].certificate.is_some());
        assert!(merged.certifications[1].certificate.is_none());
    }

    #[test]
    fn test_client_supplied_file_objects_ignored() {
        let base = existing();
        let merged = merge_profile(
            &base,
            patch(json!({
                "avatar": {"key": "someone-else/avatar.png"},
                "certifications": [{
                    "name": "New", "issuing_organization": "X", "issue_date": "2024-01-01",
                    "certificate": serde_json::to_value(file("evil/key.pdf")).unwrap()
                }]
            })),
        )
        .unwrap();
        assert_eq!(merged.avatar, base.avatar);
        assert!(merged.certifications[0].certificate.is_none());
    }

    #[test]
    fn test_remove_avatar_flag() {
        let merged = merge_profile(&existing(), patch(json!({"remove_avatar": true}))).unwrap();
        assert!(merged.avatar.is_none());
    }

    #[test]
    fn test_non_boolean_flag_rejected() {
        let map = json!({"remove_banner": "yes"}).as_object().unwrap().clone();
        assert!(ProfilePatch::from_fields(map).is_err());
    }

    #[test]
    fn test_create_requires_personal_information() {
        let map = json!({"skills": []}).as_object().unwrap().clone();
        match document_from_fields(map) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "personal_information is required"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let r = merge_profile(&existing(), patch(json!({"favourite_color": "blue"})));
        assert!(r.is_err());
    }
}
