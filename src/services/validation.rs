use std::sync::LazyLock;

use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use chrono::{DateTime, NaiveDate};
use regex::Regex;

use crate::error::AppError;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid email pattern"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ()\-]{5,18}[0-9]$").expect("invalid phone pattern"));

const MAX_NAME_CHARS: usize = 100;
const MAX_TITLE_CHARS: usize = 200;
const MIN_PASSWORD_CHARS: usize = 8;

/// `true` when `value` is an object and none of its fields carry anything:
/// every value is null, a blank string or an empty array.
pub fn are_all_fields_empty(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    let Value::Object(map) = value else {
        return false;
    };

    map.values().all(|v| match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    })
}

/// Trimmed display name.
pub fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

pub fn validate_title(raw: &str) -> Result<String, AppError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

/// Trimmed, lower-cased email address.
pub fn validate_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    if !EMAIL.is_match(&email) {
        return Err(AppError::Validation(format!("Invalid email address '{}'", raw.trim())));
    }
    Ok(email)
}

/// At least eight characters with a letter and a digit.
pub fn validate_password(raw: &str) -> Result<(), AppError> {
    if raw.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    if !raw.chars().any(char::is_alphabetic) || !raw.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Password must contain a letter and a digit".into(),
        ));
    }
    Ok(())
}

pub fn validate_phone(raw: &str) -> Result<String, AppError> {
    let phone = raw.trim();
    if !PHONE.is_match(phone) {
        return Err(AppError::Validation(format!("Invalid phone number '{phone}'")));
    }
    Ok(phone.to_string())
}

/// Parse a hex id from request input. `what` names the field in the error.
pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("Invalid {what} id '{}'", raw.trim())))
}

/// Parse a list of ids, dropping duplicates but keeping order.
pub fn parse_object_ids(raw: &[String], what: &str) -> Result<Vec<ObjectId>, AppError> {
    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let id = parse_object_id(value, what)?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// A date from request input: `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_date(raw: &str, what: &str) -> Result<BsonDateTime, AppError> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(BsonDateTime::from_chrono(midnight.and_utc()));
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| BsonDateTime::from_millis(dt.timestamp_millis()))
        .map_err(|_| AppError::Validation(format!("Invalid {what} date '{raw}'")))
}

/// Empty or blank text becomes `None`.
pub fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_fields_empty() {
        assert!(are_all_fields_empty(&json!({ "name": "", "age": null })));
        assert!(are_all_fields_empty(&json!({ "tags": [], "note": "   " })));
        assert!(are_all_fields_empty(&json!({})));
    }

    #[test]
    fn test_any_field_set() {
        assert!(!are_all_fields_empty(&json!({ "name": "Ada", "age": null })));
        assert!(!are_all_fields_empty(&json!({ "flag": false })));
        assert!(!are_all_fields_empty(&json!({ "count": 0 })));
        assert!(!are_all_fields_empty(&json!({ "tags": ["x"] })));
    }

    #[test]
    fn test_non_object_is_not_empty() {
        assert!(!are_all_fields_empty(&json!(null)));
        assert!(!are_all_fields_empty(&json!("")));
        assert!(!are_all_fields_empty(&json!([])));
    }

    #[test]
    fn test_email() {
        assert_eq!(validate_email("  Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(validate_email("ada@").is_err());
        assert!(validate_email("ada example@x.io").is_err());
    }

    #[test]
    fn test_password() {
        assert!(validate_password("s3cretpass").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_phone() {
        assert_eq!(validate_phone(" +39 02 1234567 ").unwrap(), "+39 02 1234567");
        assert!(validate_phone("(02) 555-0100").is_err(), "must start with a digit or +");
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("12").is_err());
    }

    #[test]
    fn test_name_and_title() {
        assert_eq!(validate_name("  Grace Hopper ").unwrap(), "Grace Hopper");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"t".repeat(200)).is_ok());
    }

    #[test]
    fn test_object_ids() {
        let id = ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex(), "user").unwrap(), id);

        match parse_object_id("nope", "category").unwrap_err() {
            AppError::Validation(msg) => assert!(msg.contains("category")),
            other => panic!("Expected Validation error, got: {:?}", other),
        }

        let ids = parse_object_ids(&[id.to_hex(), id.to_hex()], "user").unwrap();
        assert_eq!(ids, vec![id]);
        assert!(parse_object_ids(&[id.to_hex(), "bad".into()], "user").is_err());
    }

    #[test]
    fn test_parse_date() {
        let day = parse_date("2024-05-01", "review").unwrap();
        assert_eq!(day.to_chrono().to_rfc3339(), "2024-05-01T00:00:00+00:00");

        let instant = parse_date("2024-05-01T10:30:00+02:00", "review").unwrap();
        assert_eq!(instant.to_chrono().to_rfc3339(), "2024-05-01T08:30:00+00:00");

        assert!(matches!(parse_date("soon", "review"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some("  x ".into())), Some("x".into()));
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(None), None);
    }
}
