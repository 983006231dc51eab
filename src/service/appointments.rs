//! Booking rules: one non-cancelled appointment per doctor, date and time.

use crate::db::{is_unique_violation, Database};
use crate::error::AppError;
use crate::sql::{Direction, QueryBuilder};
use crate::store::APPOINTMENTS;
use serde_json::{Map, Value};

pub const SLOT_TAKEN: &str = "Time slot already booked";

const SLOT_FIELDS: [&str; 3] = ["appointment_date", "appointment_time", "doctor"];

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub date: Value,
    pub time: Value,
    pub doctor: Value,
}

impl Slot {
    /// Slot the row will occupy after `body` is applied on top of `existing`.
    /// `None` when the result is cancelled or a slot field is missing.
    pub fn after_write(body: &Map<String, Value>, existing: Option<&Value>) -> Option<Slot> {
        let field = |key: &str| {
            body.get(key)
                .or_else(|| existing.and_then(|row| row.get(key)))
                .filter(|v| !v.is_null())
                .cloned()
        };
        if field("status").as_ref().and_then(Value::as_str) == Some("cancelled") {
            return None;
        }
        Some(Slot {
            date: field("appointment_date")?,
            time: field("appointment_time")?,
            doctor: field("doctor")?,
        })
    }
}

/// Whether an update can change which slot the row occupies.
pub fn touches_slot(body: &Map<String, Value>) -> bool {
    body.contains_key("status") || SLOT_FIELDS.iter().any(|k| body.contains_key(*k))
}

fn slot_query(slot: &Slot) -> QueryBuilder {
    QueryBuilder::table(&APPOINTMENTS)
        .eq("appointment_date", slot.date.clone())
        .eq("appointment_time", slot.time.clone())
        .eq("doctor", slot.doctor.clone())
        .neq("status", "cancelled")
}

/// Friendly pre-check. The partial unique index is what actually closes the race.
pub async fn ensure_slot_free(db: &Database, slot: &Slot, exclude_id: Option<&str>) -> Result<(), AppError> {
    let mut q = slot_query(slot);
    if let Some(id) = exclude_id {
        q = q.neq("id", id);
    }
    if q.count(db).await? > 0 {
        tracing::warn!(date = %slot.date, time = %slot.time, doctor = %slot.doctor, "slot already booked");
        return Err(AppError::Conflict(SLOT_TAKEN.into()));
    }
    Ok(())
}

/// A unique violation from an appointment write means someone took the slot first.
pub fn map_conflict(err: AppError) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(SLOT_TAKEN.into())
    } else {
        err
    }
}

/// Times already taken on `date`, optionally for one doctor, earliest first.
pub async fn booked_slots(db: &Database, date: &str, doctor: Option<&str>) -> Result<Vec<String>, AppError> {
    let mut q = QueryBuilder::table(&APPOINTMENTS)
        .select(&["appointment_time"])
        .eq("appointment_date", date)
        .neq("status", "cancelled");
    if let Some(d) = doctor {
        q = q.eq("doctor", d);
    }
    let rows = q.order("appointment_time", Direction::Asc).get(db).await?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get("appointment_time").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn new_booking_occupies_its_slot() {
        let b = body(json!({"appointment_date": "2024-07-01", "appointment_time": "10:00", "doctor": "Dr. Patel"}));
        let slot = Slot::after_write(&b, None).unwrap();
        assert_eq!(slot.doctor, json!("Dr. Patel"));
    }

    #[test]
    fn cancelled_booking_occupies_nothing() {
        let b = body(json!({"appointment_date": "2024-07-01", "appointment_time": "10:00", "doctor": "Dr. Patel", "status": "cancelled"}));
        assert!(Slot::after_write(&b, None).is_none());
    }

    #[test]
    fn update_merges_with_stored_row() {
        let existing = json!({"appointment_date": "2024-07-01", "appointment_time": "10:00:00", "doctor": "Dr. Patel", "status": "cancelled"});
        let b = body(json!({"status": "scheduled"}));
        let slot = Slot::after_write(&b, Some(&existing)).unwrap();
        assert_eq!(slot.time, json!("10:00:00"));
        let b = body(json!({"appointment_time": "11:00"}));
        assert!(Slot::after_write(&b, Some(&existing)).is_none());
    }

    #[test]
    fn slot_query_skips_cancelled_rows() {
        let slot = Slot {
            date: json!("2024-07-01"),
            time: json!("10:00"),
            doctor: json!("Dr. Patel"),
        };
        let q = slot_query(&slot).neq("id", "x").build_count().unwrap();
        assert!(q.sql.contains(r#""appointment_date" = $1::date"#));
        assert!(q.sql.contains(r#""appointment_time" = $2::time"#));
        assert!(q.sql.contains(r#""status" <> $4"#));
        assert_eq!(q.params[3], json!("cancelled"));
    }

    #[test]
    fn only_slot_fields_trigger_a_recheck() {
        assert!(touches_slot(&body(json!({"doctor": "Dr. Lee"}))));
        assert!(touches_slot(&body(json!({"status": "scheduled"}))));
        assert!(!touches_slot(&body(json!({"notes": "bring x-rays"}))));
    }

    #[test]
    fn non_unique_errors_pass_through() {
        let e = map_conflict(AppError::NotFound("x".into()));
        assert!(matches!(e, AppError::NotFound(_)));
    }
}
