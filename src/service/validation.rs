//! Request validation from resource field rules.

use crate::config::{FieldRule, Format};
use crate::error::AppError;
use crate::sql::Table;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn email_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").ok())
        .as_ref()
}

pub fn is_valid_email(s: &str) -> bool {
    s.len() <= 254 && email_regex().map_or(false, |re| re.is_match(s))
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body. All required fields must be present and non-null.
    pub fn validate(body: &Map<String, Value>, rules: &[FieldRule]) -> Result<(), AppError> {
        for rule in rules {
            let val = body.get(rule.column);
            if rule.required && val.map_or(true, is_blank) {
                return Err(AppError::Validation(format!("{} is required", rule.column)));
            }
            if let Some(v) = val {
                validate_field(v, rule)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present (update). Required fields may be omitted but not blanked.
    pub fn validate_partial(body: &Map<String, Value>, rules: &[FieldRule]) -> Result<(), AppError> {
        for rule in rules {
            let Some(v) = body.get(rule.column) else { continue };
            if rule.required && is_blank(v) {
                return Err(AppError::Validation(format!("{} cannot be empty", rule.column)));
            }
            validate_field(v, rule)?;
        }
        Ok(())
    }
}

impl RequestValidator {
    /// Every body field that names a column must carry a JSON value of the column's type.
    /// Unknown keys are left for the insert/update builder to drop.
    pub fn check_types(body: &Map<String, Value>, table: &Table) -> Result<(), AppError> {
        for (key, v) in body {
            let Some(col) = table.column(key) else { continue };
            if !col.accepts(v) {
                return Err(AppError::Validation(format!("{} must be {}", key, col.expected())));
            }
        }
        Ok(())
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn validate_field(v: &Value, rule: &FieldRule) -> Result<(), AppError> {
    let col = rule.column;
    if v.is_null() {
        return Ok(());
    }
    if let Some(format) = rule.format {
        validate_format(col, v, format)?;
    }
    if let Some(max) = rule.max_length {
        if let Some(s) = v.as_str() {
            if s.chars().count() > max {
                return Err(AppError::Validation(format!(
                    "{} must be at most {} characters",
                    col, max
                )));
            }
        }
    }
    if !rule.allowed.is_empty() {
        let ok = v.as_str().map_or(false, |s| rule.allowed.contains(&s));
        if !ok {
            return Err(AppError::Validation(format!(
                "{} must be one of: {}",
                col,
                rule.allowed.join(", ")
            )));
        }
    }
    if rule.min.is_some() || rule.max.is_some() {
        let n = number_of(v).ok_or_else(|| AppError::Validation(format!("{} must be a number", col)))?;
        if let Some(min) = rule.min {
            if n < min as f64 {
                return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
            }
        }
        if let Some(max) = rule.max {
            if n > max as f64 {
                return Err(AppError::Validation(format!("{} must be at most {}", col, max)));
            }
        }
    }
    Ok(())
}

/// Numbers, or numeric strings as sent by HTML forms.
fn number_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn validate_format(col: &str, v: &Value, format: Format) -> Result<(), AppError> {
    let Some(s) = v.as_str() else {
        return Err(AppError::Validation(format!("{} must be a string", col)));
    };
    let ok = match format {
        Format::Email => is_valid_email(s),
        Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
        Format::Date => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        Format::Time => {
            chrono::NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
                || chrono::NaiveTime::parse_from_str(s, "%H:%M").is_ok()
        }
    };
    if !ok {
        let what = match format {
            Format::Email => "a valid email",
            Format::Uuid => "a valid UUID",
            Format::Date => "a date (YYYY-MM-DD)",
            Format::Time => "a time (HH:MM or HH:MM:SS)",
        };
        return Err(AppError::Validation(format!("{} must be {}", col, what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_values_must_match_column_types() {
        let doctors = &crate::store::DOCTORS;
        let ok = body(json!({"name": "Dr. P", "is_active": false, "unknown": 1}));
        assert!(RequestValidator::check_types(&ok, doctors).is_ok());
        let err = RequestValidator::check_types(&body(json!({"is_active": "false"})), doctors).unwrap_err();
        assert_eq!(err.to_string(), "is_active must be a boolean");
        let err = RequestValidator::check_types(&body(json!({"name": 5})), doctors).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "name must be a string"));
    }

    const RULES: &[FieldRule] = &[
        FieldRule::required("patient_email").format(Format::Email),
        FieldRule::required("rating").range(1, 5),
        FieldRule::optional("status").one_of(&["new", "reviewed"]),
        FieldRule::optional("visit_time").format(Format::Time),
        FieldRule::optional("message").max_length(5),
    ];

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_a_valid_body() {
        let b = body(json!({"patient_email": "a@example.com", "rating": 5, "status": "new", "visit_time": "09:30"}));
        assert!(RequestValidator::validate(&b, RULES).is_ok());
    }

    #[test]
    fn missing_required_field() {
        let err = RequestValidator::validate(&body(json!({"rating": 3})), RULES).unwrap_err();
        assert_eq!(err.to_string(), "patient_email is required");
    }

    #[test]
    fn rating_out_of_range() {
        let b = body(json!({"patient_email": "a@example.com", "rating": 6}));
        let err = RequestValidator::validate(&b, RULES).unwrap_err();
        assert_eq!(err.to_string(), "rating must be at most 5");
        let b = body(json!({"patient_email": "a@example.com", "rating": "0"}));
        assert!(RequestValidator::validate(&b, RULES).is_err());
    }

    #[test]
    fn enum_and_format_checks() {
        let b = body(json!({"patient_email": "a@example.com", "rating": 4, "status": "archived"}));
        assert!(RequestValidator::validate(&b, RULES).is_err());
        let b = body(json!({"patient_email": "a@example.com", "rating": 4, "visit_time": "25:00"}));
        assert!(RequestValidator::validate(&b, RULES).is_err());
        let b = body(json!({"patient_email": "a@example.com", "rating": 4, "message": "toolong"}));
        assert!(RequestValidator::validate(&b, RULES).is_err());
    }

    #[test]
    fn partial_skips_absent_required_fields_but_rejects_blanking() {
        assert!(RequestValidator::validate_partial(&body(json!({"status": "reviewed"})), RULES).is_ok());
        assert!(RequestValidator::validate_partial(&body(json!({"patient_email": ""})), RULES).is_err());
        assert!(RequestValidator::validate_partial(&body(json!({"patient_email": null})), RULES).is_err());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("jane.doe+x@clinic.example.org"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane doe@example.com"));
    }
}
