use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::validation::check_optional_len;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    Reviewing,
    Shortlisted,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Reviewing => "reviewing",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(ApplicationStatus::Submitted),
            "reviewing" => Some(ApplicationStatus::Reviewing),
            "shortlisted" => Some(ApplicationStatus::Shortlisted),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            "withdrawn" => Some(ApplicationStatus::Withdrawn),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected | ApplicationStatus::Withdrawn
        )
    }

    /// Moves a reviewer may make. Withdrawal belongs to the applicant.
    pub fn reviewer_can_move_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Submitted, Reviewing)
                | (Reviewing, Shortlisted)
                | (Reviewing, Accepted)
                | (Shortlisted, Accepted)
                | (Submitted | Reviewing | Shortlisted, Rejected)
        )
    }
}

pub fn check_review_transition(
    current: ApplicationStatus,
    next: ApplicationStatus,
) -> Result<(), AppError> {
    if current.reviewer_can_move_to(next) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Cannot move an application from {} to {}",
            current.as_str(),
            next.as_str()
        )))
    }
}

pub fn check_withdrawable(current: ApplicationStatus) -> Result<(), AppError> {
    if current.is_terminal() {
        Err(AppError::Validation(format!(
            "A {} application cannot be withdrawn",
            current.as_str()
        )))
    } else {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyFields {
    #[serde(default)]
    pub cover_letter: Option<String>,
}

impl ApplyFields {
    pub fn validate(&self) -> Result<(), AppError> {
        check_optional_len("cover_letter", self.cover_letter.as_deref(), 5000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus::*;

    #[test]
    fn test_review_path() {
        assert!(check_review_transition(Submitted, Reviewing).is_ok());
        assert!(check_review_transition(Reviewing, Shortlisted).is_ok());
        assert!(check_review_transition(Shortlisted, Accepted).is_ok());
        assert!(check_review_transition(Reviewing, Accepted).is_ok());
    }

    #[test]
    fn test_cannot_skip_review() {
        assert!(check_review_transition(Submitted, Accepted).is_err());
        assert!(check_review_transition(Submitted, Shortlisted).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [Accepted, Rejected, Withdrawn] {
            assert!(terminal.is_terminal());
            assert!(check_review_transition(terminal, Reviewing).is_err());
            assert!(check_withdrawable(terminal).is_err());
        }
    }

    #[test]
    fn test_reviewer_cannot_withdraw() {
        assert!(check_review_transition(Reviewing, Withdrawn).is_err());
        assert!(check_withdrawable(Reviewing).is_ok());
    }

    #[test]
    fn test_reject_from_any_open_state() {
        for open in [Submitted, Reviewing, Shortlisted] {
            assert!(check_review_transition(open, Rejected).is_ok());
        }
    }

    #[test]
    fn test_apply_fields_reject_unknown() {
        assert!(serde_json::from_value::<ApplyFields>(serde_json::json!({"salary": 1})).is_err());
        let f: ApplyFields = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(f.validate().is_ok());
    }
}
