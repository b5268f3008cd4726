use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::job::JobRow;
use crate::profile::models::EmploymentType;
use crate::validation::{check_currency, check_len, check_optional_len};

pub const MAX_JOB_SKILLS: usize = 30;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Draft,
    Open,
    Closed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Open => "open",
            JobStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(JobStatus::Draft),
            "open" => Some(JobStatus::Open),
            "closed" => Some(JobStatus::Closed),
            _ => None,
        }
    }

    /// Staying in the same status is always allowed.
    pub fn can_become(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Draft, Draft) | (Open, Open) | (Closed, Closed)
                | (Draft, Open)
                | (Draft, Closed)
                | (Open, Closed)
                | (Closed, Open)
        )
    }
}

/// The client-editable part of a job posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JobFields {
    pub title: String,
    pub description: String,
    pub employment_type: EmploymentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closes_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: JobStatus,
}

impl JobFields {
    pub fn from_row(row: &JobRow) -> Result<Self, AppError> {
        let employment_type = EmploymentType::parse(&row.employment_type).ok_or_else(|| {
            anyhow::anyhow!("Job {} has unknown employment type {}", row.id, row.employment_type)
        })?;
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("Job {} has unknown status {}", row.id, row.status))?;
        Ok(Self {
            title: row.title.clone(),
            description: row.description.clone(),
            employment_type,
            location: row.location.clone(),
            remote: row.remote,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            currency: row.currency.clone(),
            skills: row.skills.clone(),
            closes_at: row.closes_at,
            status,
        })
    }

    /// `previous` is the stored posting when editing; a closing date is
    /// only required to lie in the future when it is new or changed.
    pub fn validate(&self, previous: Option<&JobFields>, now: DateTime<Utc>) -> Result<(), AppError> {
        check_len("title", &self.title, 3, 150)?;
        check_len("description", &self.description, 20, 10_000)?;
        check_optional_len("location", self.location.as_deref(), 120)?;

        for (field, value) in [("salary_min", self.salary_min), ("salary_max", self.salary_max)] {
            if value.is_some_and(|v| v < 0) {
                return Err(AppError::Validation(format!("{field} must not be negative")));
            }
        }
        if let (Some(min), Some(max)) = (self.salary_min, self.salary_max) {
            if min > max {
                return Err(AppError::Validation(
                    "salary_min must not exceed salary_max".to_string(),
                ));
            }
        }
        match &self.currency {
            Some(currency) => check_currency("currency", currency)?,
            None if self.salary_min.is_some() || self.salary_max.is_some() => {
                return Err(AppError::Validation(
                    "currency is required when a salary is given".to_string(),
                ))
            }
            None => {}
        }

        if self.skills.len() > MAX_JOB_SKILLS {
            return Err(AppError::Validation(format!(
                "skills may contain at most {MAX_JOB_SKILLS} entries"
            )));
        }
        let mut seen = HashSet::new();
        for (i, skill) in self.skills.iter().enumerate() {
            check_len(&format!("skills[{i}]"), skill, 1, 50)?;
            if !seen.insert(skill.trim().to_lowercase()) {
                return Err(AppError::Validation(format!(
                    "skills[{i}]: duplicate skill '{}'",
                    skill.trim()
                )));
            }
        }

        if let Some(closes_at) = self.closes_at {
            let changed = previous.map_or(true, |p| p.closes_at != Some(closes_at));
            if changed && closes_at <= now {
                return Err(AppError::Validation("closes_at must be in the future".to_string()));
            }
        }

        match previous {
            None if self.status == JobStatus::Closed => Err(AppError::Validation(
                "A job posting cannot be created closed".to_string(),
            )),
            Some(p) if !p.status.can_become(self.status) => Err(AppError::Validation(format!(
                "Cannot move a job posting from {} to {}",
                p.status.as_str(),
                self.status.as_str()
            ))),
            _ => Ok(()),
        }
    }
}

/// Whether a posting currently accepts applications.
pub fn accepts_applications(row: &JobRow, now: DateTime<Utc>) -> bool {
    row.deleted_at.is_none()
        && row.status == JobStatus::Open.as_str()
        && row.closes_at.map_or(true, |c| c > now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> JobFields {
        serde_json::from_value(v).unwrap()
    }

    fn base() -> serde_json::Value {
        json!({
            "title": "Procurement Lead",
            "description": "Own supplier sourcing across our EU plants.",
            "employment_type": "full_time"
        })
    }

    #[test]
    fn test_defaults_to_draft() {
        let f = fields(base());
        assert_eq!(f.status, JobStatus::Draft);
        assert!(!f.remote);
        assert!(f.validate(None, Utc::now()).is_ok());
    }

    #[test]
    fn test_short_description_rejected() {
        let mut v = base();
        v["description"] = json!("too short");
        assert!(fields(v).validate(None, Utc::now()).is_err());
    }

    #[test]
    fn test_salary_range_and_currency() {
        let mut v = base();
        v["salary_min"] = json!(90_000);
        v["salary_max"] = json!(60_000);
        v["currency"] = json!("EUR");
        assert!(fields(v.clone()).validate(None, Utc::now()).is_err());

        v["salary_max"] = json!(120_000);
        assert!(fields(v.clone()).validate(None, Utc::now()).is_ok());

        v["currency"] = json!("eur");
        assert!(fields(v.clone()).validate(None, Utc::now()).is_err());

        v.as_object_mut().unwrap().remove("currency");
        let err = fields(v).validate(None, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("currency is required"));
    }

    #[test]
    fn test_closes_at_in_past_rejected_only_when_changed() {
        let now = Utc::now();
        let mut v = base();
        v["closes_at"] = json!(now - Duration::days(1));
        let past = fields(v);
        assert!(past.validate(None, now).is_err());
        // An unchanged, already elapsed date does not block other edits.
        assert!(past.validate(Some(&past.clone()), now).is_ok());
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Draft.can_become(Open));
        assert!(Open.can_become(Closed));
        assert!(Closed.can_become(Open));
        assert!(Draft.can_become(Closed));
        assert!(!Open.can_become(Draft));
        assert!(!Closed.can_become(Draft));
    }

    #[test]
    fn test_cannot_reopen_as_draft_through_validate() {
        let now = Utc::now();
        let mut open = fields(base());
        open.status = JobStatus::Open;
        let mut draft = open.clone();
        draft.status = JobStatus::Draft;
        assert!(draft.validate(Some(&open), now).is_err());
    }

    #[test]
    fn test_create_closed_rejected() {
        let mut v = base();
        v["status"] = json!("closed");
        assert!(fields(v).validate(None, Utc::now()).is_err());
    }

    #[test]
    fn test_duplicate_skills_rejected() {
        let mut v = base();
        v["skills"] = json!(["Sourcing", "sourcing"]);
        assert!(fields(v).validate(None, Utc::now()).is_err());
    }
}
