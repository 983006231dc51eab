//! Generic CRUD over resource descriptors, with per-resource write rules.

use super::{appointments, financials, patient_services, RequestValidator};
use crate::config::{FilterKind, Resource, WriteRules};
use crate::db::{reject_bad_input, Database};
use crate::error::AppError;
use crate::sql::{Filter, QueryBuilder, MAX_LIMIT};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u32 = 100;

pub struct CrudService;

/// Primary keys are UUIDs; anything else is a 400 rather than a cast error from the database.
pub fn parse_id(id: &str) -> Result<Value, AppError> {
    let u = uuid::Uuid::parse_str(id.trim()).map_err(|_| AppError::BadRequest("invalid id".into()))?;
    Ok(Value::String(u.to_string()))
}

/// Translate list query parameters into a builder: resource filters, default order, paging.
/// Unknown parameters are ignored.
pub fn list_query(resource: &'static Resource, params: &HashMap<String, String>) -> Result<QueryBuilder, AppError> {
    let mut q = QueryBuilder::table(resource.table);
    for f in resource.filters {
        let Some(raw) = params.get(f.param).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            continue;
        };
        match f.kind {
            FilterKind::FlagTrue => {
                if raw.eq_ignore_ascii_case("true") {
                    q = q.eq(f.column, true);
                }
            }
            FilterKind::Exact => {
                let is_uuid = resource
                    .table
                    .column(f.column)
                    .map_or(false, |c| c.pg_type == Some("uuid"));
                let value = if is_uuid {
                    parse_id(raw).map_err(|_| AppError::BadRequest(format!("{} must be a UUID", f.param)))?
                } else {
                    Value::String(raw.to_string())
                };
                q = q.eq(f.column, value);
            }
        }
    }
    for (col, dir) in resource.order {
        q = q.order(col, *dir);
    }
    let limit = match params.get("limit") {
        Some(s) => s
            .parse::<u32>()
            .map_err(|_| AppError::BadRequest("limit must be a non-negative integer".into()))?,
        None => DEFAULT_LIMIT,
    };
    q = q.limit(limit.min(MAX_LIMIT));
    if let Some(s) = params.get("offset") {
        let offset = s
            .parse::<u32>()
            .map_err(|_| AppError::BadRequest("offset must be a non-negative integer".into()))?;
        q = q.offset(offset);
    }
    Ok(q)
}

/// Fill omitted columns with the resource's defaults.
pub fn apply_defaults(resource: &Resource, body: &mut Map<String, Value>) {
    for (col, default) in resource.defaults {
        let missing = body.get(*col).map_or(true, Value::is_null);
        if missing {
            body.insert(col.to_string(), default.to_json());
        }
    }
}

impl CrudService {
    pub async fn list(
        db: &Database,
        resource: &'static Resource,
        params: &HashMap<String, String>,
    ) -> Result<Vec<Value>, AppError> {
        list_query(resource, params)?.get(db).await
    }

    pub async fn read(db: &Database, resource: &'static Resource, id: &str) -> Result<Option<Value>, AppError> {
        let id = parse_id(id)?;
        QueryBuilder::table(resource.table)
            .eq(resource.table.pk, id)
            .single(db)
            .await
    }

    /// Validate, apply defaults and write rules, insert. Returns the stored row.
    pub async fn create(
        db: &Database,
        resource: &'static Resource,
        mut body: Map<String, Value>,
    ) -> Result<Value, AppError> {
        RequestValidator::validate(&body, resource.rules)?;
        RequestValidator::check_types(&body, resource.table)?;
        apply_defaults(resource, &mut body);
        match resource.write_rules {
            WriteRules::Plain => {}
            WriteRules::Appointments => {
                if let Some(slot) = appointments::Slot::after_write(&body, None) {
                    appointments::ensure_slot_free(db, &slot, None).await?;
                }
            }
            WriteRules::Financials => financials::prepare_create(&mut body)?,
            WriteRules::PatientServices => {
                patient_services::stamp_completion(&mut body, chrono::Utc::now().date_naive())
            }
        }
        let result = db.insert(resource.table, &body).await.map_err(reject_bad_input);
        let row = match resource.write_rules {
            WriteRules::Appointments => result.map_err(appointments::map_conflict)?,
            _ => result?,
        };
        tracing::info!(resource = resource.path, id = ?row.get(resource.table.pk), "created");
        Ok(row)
    }

    /// Validate present fields, apply write rules, update by id. `None` when the id does not exist.
    pub async fn update(
        db: &Database,
        resource: &'static Resource,
        id: &str,
        mut body: Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let id = parse_id(id)?;
        body.remove(resource.table.pk);
        RequestValidator::validate_partial(&body, resource.rules)?;
        RequestValidator::check_types(&body, resource.table)?;
        let id_str = id.as_str().unwrap_or_default().to_string();
        match resource.write_rules {
            WriteRules::Plain => {}
            WriteRules::Appointments => {
                if appointments::touches_slot(&body) {
                    let Some(existing) = Self::read(db, resource, &id_str).await? else {
                        return Ok(None);
                    };
                    if let Some(slot) = appointments::Slot::after_write(&body, Some(&existing)) {
                        appointments::ensure_slot_free(db, &slot, Some(&id_str)).await?;
                    }
                }
            }
            WriteRules::Financials => {
                let existing = if financials::needs_existing(&body) {
                    match Self::read(db, resource, &id_str).await? {
                        Some(row) => Some(row),
                        None => return Ok(None),
                    }
                } else {
                    None
                };
                financials::prepare_update(&mut body, existing.as_ref())?;
            }
            WriteRules::PatientServices => {
                patient_services::stamp_completion(&mut body, chrono::Utc::now().date_naive())
            }
        }
        let result = db
            .update_where(resource.table, vec![Filter::eq(resource.table.pk, id)], &body)
            .await
            .map_err(reject_bad_input);
        let rows = match resource.write_rules {
            WriteRules::Appointments => result.map_err(appointments::map_conflict)?,
            _ => result?,
        };
        Ok(rows.into_iter().next())
    }

    /// Delete by id; returns the deleted row, `None` when it did not exist.
    pub async fn delete(db: &Database, resource: &'static Resource, id: &str) -> Result<Option<Value>, AppError> {
        let id = parse_id(id)?;
        let rows = db
            .delete_where(resource.table, vec![Filter::eq(resource.table.pk, id)])
            .await?;
        if !rows.is_empty() {
            tracing::info!(resource = resource.path, "deleted");
        }
        Ok(rows.into_iter().next())
    }
}
