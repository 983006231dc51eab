use chrono::NaiveDate;
use serde_json::{Map, Value};

/// When a write sets `status = completed` without a completion date, stamp `today`.
pub fn stamp_completion(body: &mut Map<String, Value>, today: NaiveDate) {
    let completing = body.get("status").and_then(Value::as_str) == Some("completed");
    let has_date = body.get("completed_date").map_or(false, |v| !v.is_null());
    if completing && !has_date {
        body.insert(
            "completed_date".into(),
            Value::String(today.format("%Y-%m-%d").to_string()),
        );
    }
}
