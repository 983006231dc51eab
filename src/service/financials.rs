//! Patient balance: `remaining_from_patient` is always total minus paid, computed here.

use crate::error::AppError;
use serde_json::{Map, Number, Value};

pub const TOTAL: &str = "total_treatment_cost";
pub const PAID: &str = "amount_paid_by_patient";
pub const REMAINING: &str = "remaining_from_patient";

/// Rounded to cents.
pub fn remaining(total: f64, paid: f64) -> f64 {
    ((total - paid) * 100.0).round() / 100.0
}

fn amount(body: &Map<String, Value>, key: &str) -> Result<Option<f64>, AppError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{} must be a number", key))),
        Some(_) => Err(AppError::Validation(format!("{} must be a number", key))),
    }
}

fn number(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Create: missing amounts are 0; the remainder is derived.
pub fn prepare_create(body: &mut Map<String, Value>) -> Result<(), AppError> {
    body.remove(REMAINING);
    let total = amount(body, TOTAL)?.unwrap_or(0.0);
    let paid = amount(body, PAID)?.unwrap_or(0.0);
    body.insert(TOTAL.into(), number(total));
    body.insert(PAID.into(), number(paid));
    body.insert(REMAINING.into(), number(remaining(total, paid)));
    Ok(())
}

/// True when the update needs the stored row to recompute the remainder.
pub fn needs_existing(body: &Map<String, Value>) -> bool {
    body.contains_key(TOTAL) || body.contains_key(PAID)
}

/// Update: when either amount changes, the other comes from `existing`.
pub fn prepare_update(body: &mut Map<String, Value>, existing: Option<&Value>) -> Result<(), AppError> {
    body.remove(REMAINING);
    if !needs_existing(body) {
        return Ok(());
    }
    let stored = |key: &str| existing.and_then(|row| row.get(key)).and_then(Value::as_f64);
    let total = amount(body, TOTAL)?.or_else(|| stored(TOTAL)).unwrap_or(0.0);
    let paid = amount(body, PAID)?.or_else(|| stored(PAID)).unwrap_or(0.0);
    body.insert(REMAINING.into(), number(remaining(total, paid)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn create_derives_remainder_and_discards_client_value() {
        let mut b = body(json!({"patient_id": "p", "total_treatment_cost": 1200.5, "amount_paid_by_patient": "200.25", "remaining_from_patient": 9999}));
        prepare_create(&mut b).unwrap();
        assert_eq!(b[REMAINING], json!(1000.25));
        assert_eq!(b[PAID], json!(200.25));
    }

    #[test]
    fn create_defaults_amounts_to_zero() {
        let mut b = body(json!({"patient_id": "p"}));
        prepare_create(&mut b).unwrap();
        assert_eq!(b[TOTAL], json!(0.0));
        assert_eq!(b[REMAINING], json!(0.0));
    }

    #[test]
    fn update_reads_the_other_amount_from_the_stored_row() {
        let existing = json!({"total_treatment_cost": 500.0, "amount_paid_by_patient": 100.0});
        let mut b = body(json!({"amount_paid_by_patient": 450}));
        prepare_update(&mut b, Some(&existing)).unwrap();
        assert_eq!(b[REMAINING], json!(50.0));
        assert!(!b.contains_key(TOTAL));
    }

    #[test]
    fn update_without_amounts_leaves_remainder_alone() {
        let mut b = body(json!({"notes": "paid in cash", "remaining_from_patient": 1}));
        prepare_update(&mut b, None).unwrap();
        assert!(!b.contains_key(REMAINING));
    }

    #[test]
    fn non_numeric_amount_is_rejected() {
        let mut b = body(json!({"total_treatment_cost": "lots"}));
        assert!(matches!(prepare_create(&mut b), Err(AppError::Validation(_))));
    }

    #[test]
    fn remainder_is_rounded_to_cents() {
        assert_eq!(remaining(0.3, 0.1), 0.2);
        assert_eq!(remaining(100.0, 150.0), -50.0);
    }
}
