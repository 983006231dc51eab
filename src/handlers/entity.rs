//! Resource CRUD handlers: list, read, create, update, delete.

use crate::config::{resource_by_path, Operation, Resource};
use crate::error::AppError;
use crate::extractors::{ensure_access, ApiJson, BearerToken};
use crate::response::{created, no_content, success_many, success_one};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Resolve the path segment and check the operation is offered and the caller may use it.
async fn authorize(
    state: &AppState,
    path: &str,
    op: Operation,
    bearer: &BearerToken,
) -> Result<&'static Resource, AppError> {
    let resource = resource_by_path(path).ok_or_else(|| AppError::NotFound(format!("resource {}", path)))?;
    if !resource.allows(op) {
        return Err(AppError::MethodNotAllowed);
    }
    ensure_access(state, resource.access(op), bearer).await?;
    Ok(resource)
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn not_found(resource: &Resource, id: &str) -> AppError {
    AppError::NotFound(format!("{} {}", resource.path, id))
}

pub async fn list(
    State(state): State<AppState>,
    Path(path): Path<String>,
    bearer: BearerToken,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let resource = authorize(&state, &path, Operation::List, &bearer).await?;
    let rows = CrudService::list(&state.db, resource, &params).await?;
    Ok(success_many(rows).into_response())
}

pub async fn read(
    State(state): State<AppState>,
    Path((path, id)): Path<(String, String)>,
    bearer: BearerToken,
) -> Result<Response, AppError> {
    let resource = authorize(&state, &path, Operation::Read, &bearer).await?;
    let row = CrudService::read(&state.db, resource, &id)
        .await?
        .ok_or_else(|| not_found(resource, &id))?;
    Ok(success_one(row).into_response())
}

pub async fn create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    bearer: BearerToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Response, AppError> {
    let resource = authorize(&state, &path, Operation::Create, &bearer).await?;
    let row = CrudService::create(&state.db, resource, body_to_map(body)?).await?;
    Ok(created(row).into_response())
}

pub async fn update(
    State(state): State<AppState>,
    Path((path, id)): Path<(String, String)>,
    bearer: BearerToken,
    ApiJson(body): ApiJson<Value>,
) -> Result<Response, AppError> {
    let resource = authorize(&state, &path, Operation::Update, &bearer).await?;
    let body = body_to_map(body)?;
    if body.is_empty() {
        return Err(AppError::BadRequest("no fields to update".into()));
    }
    let row = CrudService::update(&state.db, resource, &id, body)
        .await?
        .ok_or_else(|| not_found(resource, &id))?;
    Ok(success_one(row).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path, id)): Path<(String, String)>,
    bearer: BearerToken,
) -> Result<Response, AppError> {
    let resource = authorize(&state, &path, Operation::Delete, &bearer).await?;
    CrudService::delete(&state.db, resource, &id)
        .await?
        .ok_or_else(|| not_found(resource, &id))?;
    Ok(no_content())
}

/// Fallback for methods a route does not register at all.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
