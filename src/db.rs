//! Database adapter: an injected pool handle, parameter binding, transactions and row → JSON.

use crate::error::AppError;
use crate::sql::{insert, Filter, PgBindValue, QueryBuf, QueryBuilder, Table};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};

/// Shared handle; cheap to clone (the pool is reference counted).
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Database { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bind_all(q).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_all(q).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    /// Run a statement without rows; returns rows affected.
    pub async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let result = bind_all(q).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Insert one row; returns it as stored (defaults filled in).
    pub async fn insert(&self, table: &Table, data: &Map<String, Value>) -> Result<Value, AppError> {
        let q = insert(table, data);
        self.fetch_optional(&q)
            .await?
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))
    }

    /// UPDATE rows matching every filter; returns them as stored.
    pub async fn update_where(
        &self,
        table: &'static Table,
        filters: Vec<Filter>,
        data: &Map<String, Value>,
    ) -> Result<Vec<Value>, AppError> {
        let q = filtered(table, filters).build_update(data)?;
        self.fetch_all(&q).await
    }

    /// DELETE rows matching every filter; returns the deleted rows.
    pub async fn delete_where(&self, table: &'static Table, filters: Vec<Filter>) -> Result<Vec<Value>, AppError> {
        let q = filtered(table, filters).build_delete()?;
        self.fetch_all(&q).await
    }

    pub async fn begin(&self) -> Result<Transaction, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Transaction { tx })
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await.is_ok()
    }
}

/// Open transaction. Dropping it without `commit` rolls back.
pub struct Transaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl Transaction {
    pub async fn fetch_optional(&mut self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let row = bind_all(q).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    pub async fn execute(&mut self, q: &QueryBuf) -> Result<u64, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute (tx)");
        let result = bind_all(q).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    pub async fn insert(&mut self, table: &Table, data: &Map<String, Value>) -> Result<Value, AppError> {
        let q = insert(table, data);
        self.fetch_optional(&q)
            .await?
            .ok_or_else(|| AppError::Db(sqlx::Error::RowNotFound))
    }

    pub async fn update_where(
        &mut self,
        table: &'static Table,
        filters: Vec<Filter>,
        data: &Map<String, Value>,
    ) -> Result<Vec<Value>, AppError> {
        let q = filtered(table, filters).build_update(data)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let rows = bind_all(&q).fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn filtered(table: &'static Table, filters: Vec<Filter>) -> QueryBuilder {
    filters.into_iter().fold(QueryBuilder::table(table), QueryBuilder::filter)
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

/// True when the error is a unique-constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &AppError) -> bool {
    match err {
        AppError::Db(sqlx::Error::Database(db)) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// SQLSTATEs caused by the values a client sent: bad literals, out-of-range numbers,
/// NOT NULL / foreign key / CHECK violations and type mismatches.
const INPUT_ERROR_CODES: &[&str] = &[
    "22P02", "22003", "22007", "22008", "23502", "23503", "23514", "42804", "42883",
];

pub fn is_input_error(code: &str) -> bool {
    INPUT_ERROR_CODES.contains(&code)
}

/// Turn a write rejected for its input into a 400; anything else passes through.
pub fn reject_bad_input(err: AppError) -> AppError {
    if let AppError::Db(sqlx::Error::Database(db)) = &err {
        if db.code().map_or(false, |c| is_input_error(&c)) {
            tracing::debug!(code = ?db.code(), error = %db.message(), "write rejected");
            return AppError::Validation(db.message().to_string());
        }
    }
    err
}

pub fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(t)) = row.try_get::<Option<chrono::NaiveTime>, _>(name) {
        return Value::String(t.format("%H:%M:%S").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_client_faults() {
        assert!(is_input_error("22P02"));
        assert!(is_input_error("23503"));
        assert!(is_input_error("42883"));
        assert!(!is_input_error("23505"));
        assert!(!is_input_error("08006"));
    }

    #[test]
    fn other_errors_pass_through() {
        let err = reject_bad_input(AppError::Db(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, AppError::Db(sqlx::Error::PoolTimedOut)));
    }
}
