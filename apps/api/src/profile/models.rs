use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StoredFile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Freelance,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "full_time",
            EmploymentType::PartTime => "part_time",
            EmploymentType::Contract => "contract",
            EmploymentType::Internship => "internship",
            EmploymentType::Freelance => "freelance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full_time" => Some(EmploymentType::FullTime),
            "part_time" => Some(EmploymentType::PartTime),
            "contract" => Some(EmploymentType::Contract),
            "internship" => Some(EmploymentType::Internship),
            "freelance" => Some(EmploymentType::Freelance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PersonalInformation {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_of_study: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExperienceEntry {
    pub company: String,
    pub title: String,
    pub employment_type: EmploymentType,
    pub start_date: NaiveDate,
    /// None = current position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Skill {
    pub name: String,
    pub level: SkillLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Certification {
    /// Server-assigned when the client omits it.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub issuing_organization: String,
    pub issue_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_url: Option<String>,
    /// The single certificate file attached to this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<StoredFile>,
}

/// The nested profile document persisted as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileDocument {
    pub personal_information: PersonalInformation,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<StoredFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<StoredFile>,
}

impl ProfileDocument {
    /// Every object key referenced by the document.
    pub fn file_keys(&self) -> HashSet<String> {
        self.avatar
            .iter()
            .chain(self.banner.iter())
            .chain(
                self.certifications
                    .iter()
                    .filter_map(|c| c.certificate.as_ref()),
            )
            .map(|f| f.key.clone())
            .collect()
    }

    pub fn certification_mut(&mut self, id: Uuid) -> Option<&mut Certification> {
        self.certifications.iter_mut().find(|c| c.id == id)
    }
}
