use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::business::BusinessRow;
use crate::validation::{check_len, check_optional_len, check_url};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompanySize {
    #[serde(rename = "1-10")]
    Micro,
    #[serde(rename = "11-50")]
    Small,
    #[serde(rename = "51-200")]
    Medium,
    #[serde(rename = "201-1000")]
    Large,
    #[serde(rename = "1000+")]
    Enterprise,
}

impl CompanySize {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanySize::Micro => "1-10",
            CompanySize::Small => "11-50",
            CompanySize::Medium => "51-200",
            CompanySize::Large => "201-1000",
            CompanySize::Enterprise => "1000+",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            CompanySize::Micro,
            CompanySize::Small,
            CompanySize::Medium,
            CompanySize::Large,
            CompanySize::Enterprise,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
    }
}

/// The client-editable part of a business profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BusinessFields {
    pub name: String,
    pub industry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<CompanySize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i32>,
}

impl BusinessFields {
    pub fn from_row(row: &BusinessRow) -> Self {
        Self {
            name: row.name.clone(),
            industry: row.industry.clone(),
            description: row.description.clone(),
            website: row.website.clone(),
            location: row.location.clone(),
            company_size: row.company_size.as_deref().and_then(CompanySize::parse),
            founded_year: row.founded_year,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        check_len("name", &self.name, 2, 120)?;
        check_len("industry", &self.industry, 1, 80)?;
        check_optional_len("description", self.description.as_deref(), 5000)?;
        check_optional_len("location", self.location.as_deref(), 120)?;
        if let Some(website) = &self.website {
            check_url("website", website)?;
        }
        if let Some(year) = self.founded_year {
            let current = Utc::now().year();
            if !(1800..=current).contains(&year) {
                return Err(AppError::Validation(format!(
                    "founded_year must be between 1800 and {current}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> BusinessFields {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_valid_business() {
        let f = fields(json!({
            "name": "Acme Supply", "industry": "Manufacturing",
            "website": "https://acme.io", "company_size": "51-200", "founded_year": 1998
        }));
        assert!(f.validate().is_ok());
        assert_eq!(f.company_size, Some(CompanySize::Medium));
    }

    #[test]
    fn test_unknown_company_size_rejected() {
        assert!(serde_json::from_value::<BusinessFields>(json!({
            "name": "Acme", "industry": "x", "company_size": "huge"
        }))
        .is_err());
    }

    #[test]
    fn test_founded_year_bounds() {
        let f = fields(json!({"name": "Acme", "industry": "x", "founded_year": 1700}));
        assert!(f.validate().is_err());
        let f = fields(json!({"name": "Acme", "industry": "x", "founded_year": 3000}));
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_short_name_rejected() {
        let f = fields(json!({"name": "A", "industry": "x"}));
        assert!(f.validate().is_err());
    }

    #[test]
    fn test_company_size_parse_round_trip() {
        for s in ["1-10", "11-50", "51-200", "201-1000", "1000+"] {
            assert_eq!(CompanySize::parse(s).unwrap().as_str(), s);
        }
    }
}
