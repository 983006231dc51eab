//! Booked-slot lookup for the booking form.

use crate::error::AppError;
use crate::response::success_many;
use crate::service::appointments;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct BookedSlotsQuery {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
}

/// `YYYY-MM-DD` from the query, or 400.
fn required_date(q: &BookedSlotsQuery) -> Result<&str, AppError> {
    let date = q
        .date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::Validation("date is required".into()))?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be YYYY-MM-DD".into()))?;
    Ok(date)
}

pub async fn booked_slots(
    State(state): State<AppState>,
    Query(q): Query<BookedSlotsQuery>,
) -> Result<Response, AppError> {
    let date = required_date(&q)?;
    let doctor = q.doctor.as_deref().map(str::trim).filter(|d| !d.is_empty());
    let times = appointments::booked_slots(&state.db, date, doctor).await?;
    Ok(success_many(times).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(date: Option<&str>) -> BookedSlotsQuery {
        BookedSlotsQuery {
            date: date.map(str::to_string),
            doctor: None,
        }
    }

    #[test]
    fn date_is_required_and_checked() {
        assert!(matches!(required_date(&q(None)), Err(AppError::Validation(_))));
        assert!(matches!(required_date(&q(Some("07/01/2024"))), Err(AppError::Validation(_))));
        assert_eq!(required_date(&q(Some(" 2024-07-01 "))).unwrap(), "2024-07-01");
    }
}
