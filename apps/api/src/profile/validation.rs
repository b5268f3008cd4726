use std::collections::HashSet;

use chrono::Utc;

use crate::errors::AppError;
use crate::profile::models::ProfileDocument;
use crate::validation::{check_date_order, check_len, check_optional_len, check_url};

pub const MAX_SKILLS: usize = 100;
pub const MAX_ENTRIES: usize = 50;

/// Validates a fully merged profile document.
pub fn validate_profile(doc: &ProfileDocument) -> Result<(), AppError> {
    let pi = &doc.personal_information;
    check_len("personal_information.first_name", &pi.first_name, 1, 50)?;
    check_len("personal_information.last_name", &pi.last_name, 1, 50)?;
    check_optional_len("personal_information.headline", pi.headline.as_deref(), 120)?;
    check_optional_len("personal_information.bio", pi.bio.as_deref(), 2000)?;
    check_optional_len("personal_information.location", pi.location.as_deref(), 120)?;
    check_optional_len("personal_information.phone", pi.phone.as_deref(), 30)?;
    if let Some(website) = &pi.website {
        check_url("personal_information.website", website)?;
    }
    if let Some(dob) = pi.date_of_birth {
        if dob >= Utc::now().date_naive() {
            return Err(AppError::Validation(
                "personal_information.date_of_birth must be in the past".to_string(),
            ));
        }
    }

    check_count("education", doc.education.len(), MAX_ENTRIES)?;
    for (i, e) in doc.education.iter().enumerate() {
        let field = format!("education[{i}]");
        check_len(&format!("{field}.institution"), &e.institution, 1, 150)?;
        check_len(&format!("{field}.degree"), &e.degree, 1, 100)?;
        check_optional_len(&format!("{field}.field_of_study"), e.field_of_study.as_deref(), 100)?;
        check_optional_len(&format!("{field}.description"), e.description.as_deref(), 2000)?;
        check_date_order(&field, Some(e.start_date), e.end_date)?;
    }

    check_count("experience", doc.experience.len(), MAX_ENTRIES)?;
    for (i, e) in doc.experience.iter().enumerate() {
        let field = format!("experience[{i}]");
        check_len(&format!("{field}.company"), &e.company, 1, 150)?;
        check_len(&format!("{field}.title"), &e.title, 1, 100)?;
        check_optional_len(&format!("{field}.description"), e.description.as_deref(), 5000)?;
        check_date_order(&field, Some(e.start_date), e.end_date)?;
    }

    check_count("skills", doc.skills.len(), MAX_SKILLS)?;
    let mut seen = HashSet::new();
    for (i, s) in doc.skills.iter().enumerate() {
        check_len(&format!("skills[{i}].name"), &s.name, 1, 50)?;
        if !seen.insert(s.name.trim().to_lowercase()) {
            return Err(AppError::Validation(format!(
                "skills[{i}]: duplicate skill '{}'",
                s.name.trim()
            )));
        }
    }

    check_count("certifications", doc.certifications.len(), MAX_ENTRIES)?;
    let mut ids = HashSet::new();
    for (i, c) in doc.certifications.iter().enumerate() {
        let field = format!("certifications[{i}]");
        if !ids.insert(c.id) {
            return Err(AppError::Validation(format!(
                "{field}: duplicate certification id {}",
                c.id
            )));
        }
        check_len(&format!("{field}.name"), &c.name, 1, 150)?;
        check_len(
            &format!("{field}.issuing_organization"),
            &c.issuing_organization,
            1,
            150,
        )?;
        check_optional_len(&format!("{field}.credential_id"), c.credential_id.as_deref(), 100)?;
        if let Some(url) = &c.credential_url {
            check_url(&format!("{field}.credential_url"), url)?;
        }
        check_date_order(&field, Some(c.issue_date), c.expiration_date)?;
    }

    Ok(())
}

fn check_count(field: &str, count: usize, max: usize) -> Result<(), AppError> {
    if count > max {
        return Err(AppError::Validation(format!(
            "{field} may contain at most {max} entries"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> ProfileDocument {
        serde_json::from_value(value).unwrap()
    }

    fn minimal() -> serde_json::Value {
        json!({
            "personal_information": {"first_name": "Ada", "last_name": "Lovelace"}
        })
    }

    #[test]
    fn test_minimal_profile_passes() {
        assert!(validate_profile(&doc(minimal())).is_ok());
    }

    #[test]
    fn test_blank_first_name_fails() {
        let d = doc(json!({"personal_information": {"first_name": " ", "last_name": "L"}}));
        assert!(validate_profile(&d).is_err());
    }

    #[test]
    fn test_education_dates_must_be_ordered() {
        let mut v = minimal();
        v["education"] = json!([{
            "institution": "MIT", "degree": "BSc",
            "start_date": "2020-09-01", "end_date": "2019-06-01"
        }]);
        let err = validate_profile(&doc(v)).unwrap_err();
        assert!(err.to_string().contains("education[0]"));
    }

    #[test]
    fn test_duplicate_skills_case_insensitive() {
        let mut v = minimal();
        v["skills"] = json!([
            {"name": "Rust", "level": "expert"},
            {"name": "rust ", "level": "beginner"}
        ]);
        assert!(validate_profile(&doc(v)).is_err());
    }

    #[test]
    fn test_certification_expiry_before_issue_fails() {
        let mut v = minimal();
        v["certifications"] = json!([{
            "name": "AWS SA", "issuing_organization": "AWS",
            "issue_date": "2023-01-01", "expiration_date": "2022-01-01"
        }]);
        assert!(validate_profile(&doc(v)).is_err());
    }

    #[test]
    fn test_duplicate_certification_ids_fail() {
        let id = uuid::Uuid::new_v4();
        let mut v = minimal();
        v["certifications"] = json!([
            {"id": id, "name": "A", "issuing_organization": "X", "issue_date": "2023-01-01"},
            {"id": id, "name": "B", "issuing_organization": "Y", "issue_date": "2023-01-01"}
        ]);
        assert!(validate_profile(&doc(v)).is_err());
    }

    #[test]
    fn test_future_birth_date_fails() {
        let mut v = minimal();
        v["personal_information"]["date_of_birth"] = json!("2999-01-01");
        assert!(validate_profile(&doc(v)).is_err());
    }

    #[test]
    fn test_bad_website_fails() {
        let mut v = minimal();
        v["personal_information"]["website"] = json!("javascript:alert(1)");
        assert!(validate_profile(&doc(v)).is_err());
    }

    #[test]
    fn test_unknown_employment_type_rejected_at_parse() {
        let mut v = minimal();
        v["experience"] = json!([{
            "company": "Acme", "title": "Eng", "employment_type": "gig",
            "start_date": "2020-01-01"
        }]);
        assert!(serde_json::from_value::<ProfileDocument>(v).is_err());
    }
}
