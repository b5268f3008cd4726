//! Field-level checks shared by every module. Each helper returns an
//! `AppError::Validation` naming the offending field.

use chrono::NaiveDate;

use crate::errors::AppError;

/// Checks a trimmed string's char count lies within `min..=max`.
pub fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.trim().chars().count();
    if len < min {
        return Err(if min == 1 {
            AppError::Validation(format!("{field} is required"))
        } else {
            AppError::Validation(format!("{field} must be at least {min} characters"))
        });
    }
    if len > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn check_optional_len(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<(), AppError> {
    match value {
        Some(v) => check_len(field, v, 0, max),
        None => Ok(()),
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_email(field: &str, email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid && email.len() <= 254 {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{field} must be a valid email address"
        )))
    }
}

pub fn check_url(field: &str, url: &str) -> Result<(), AppError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') && url.len() <= 2048 => Ok(()),
        _ => Err(AppError::Validation(format!(
            "{field} must be an http(s) URL"
        ))),
    }
}

/// Three-letter uppercase ISO 4217 style code.
pub fn check_currency(field: &str, currency: &str) -> Result<(), AppError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{field} must be a 3-letter uppercase currency code"
        )))
    }
}

/// `end` must not precede `start`; an absent end means "ongoing".
pub fn check_date_order(
    field: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(format!(
                "{field}: end date {end} is before start date {start}"
            )));
        }
    }
    Ok(())
}

/// Parses a JSON document into `T`, reporting serde's message as a 400.
pub fn from_json<T>(what: &str, value: serde_json::Value) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(value).map_err(|e| AppError::Validation(format!("Invalid {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len_bounds() {
        assert!(check_len("name", "  ", 1, 10).is_err());
        assert!(check_len("name", "Acme", 2, 10).is_ok());
        assert!(check_len("name", "A", 2, 10).is_err());
        assert!(check_len("name", &"x".repeat(11), 1, 10).is_err());
    }

    #[test]
    fn test_required_message() {
        match check_len("first_name", "", 1, 50) {
            Err(AppError::Validation(msg)) => assert_eq!(msg, "first_name is required"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_email() {
        assert!(check_email("email", "buyer@acme.io").is_ok());
        assert!(check_email("email", "buyer@acme").is_err());
        assert!(check_email("email", "@acme.io").is_err());
        assert!(check_email("email", "a b@acme.io").is_err());
        assert!(check_email("email", "a@b@acme.io").is_err());
        assert_eq!(normalize_email("  Buyer@ACME.io "), "buyer@acme.io");
    }

    #[test]
    fn test_url() {
        assert!(check_url("website", "https://acme.io").is_ok());
        assert!(check_url("website", "http://acme.io/about").is_ok());
        assert!(check_url("website", "ftp://acme.io").is_err());
        assert!(check_url("website", "https://").is_err());
    }

    #[test]
    fn test_currency() {
        assert!(check_currency("currency", "USD").is_ok());
        assert!(check_currency("currency", "usd").is_err());
        assert!(check_currency("currency", "EURO").is_err());
    }

    #[test]
    fn test_date_order() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert!(check_date_order("education[0]", d(2018, 9, 1), d(2022, 6, 30)).is_ok());
        assert!(check_date_order("education[0]", d(2022, 9, 1), d(2018, 6, 30)).is_err());
        assert!(check_date_order("education[0]", d(2022, 9, 1), None).is_ok());
    }
}
