//! Fluent query builder: chained predicates, ordering and paging become one parameterized statement.
//!
//! Predicates are kept as structured `Filter` triples (column, operator, value). SELECT,
//! COUNT, UPDATE and DELETE all render their WHERE clause from those triples, and every
//! placeholder is allocated from the statement's single counter, so parameter keys never
//! collide no matter how often a column appears in the chain.

use crate::db::Database;
use crate::error::AppError;
use crate::sql::table::{quoted, select_column_list, select_expr, Column, Table};
use serde_json::{Map, Value};

/// Upper bound applied to any LIMIT.
pub const MAX_LIMIT: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive pattern match.
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    fn comparison(&self) -> Option<&'static str> {
        match self {
            FilterOp::Eq => Some("="),
            FilterOp::Neq => Some("<>"),
            FilterOp::Gt => Some(">"),
            FilterOp::Gte => Some(">="),
            FilterOp::Lt => Some("<"),
            FilterOp::Lte => Some("<="),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    None,
    One(Value),
    Many(Vec<Value>),
}

/// One predicate of the chain.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Filter {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::new(column, FilterOp::Eq, FilterValue::One(value.into()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Anything other than `desc` (any case) sorts ascending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// SQL text plus positional parameters; `params[i]` binds to `$(i + 1)`.
#[derive(Clone, Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf::default()
    }

    pub fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

#[derive(Clone, Debug)]
pub struct QueryBuilder {
    table: &'static Table,
    columns: Option<Vec<String>>,
    filters: Vec<Filter>,
    order: Vec<(String, Direction)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl QueryBuilder {
    pub fn table(table: &'static Table) -> Self {
        QueryBuilder {
            table,
            columns: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Narrow the projection. Default is every column of the table.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    fn compare(self, column: &str, op: FilterOp, value: Value) -> Self {
        self.filter(Filter::new(column, op, FilterValue::One(value)))
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, FilterOp::Eq, value.into())
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, FilterOp::Neq, value.into())
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, FilterOp::Gt, value.into())
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, FilterOp::Gte, value.into())
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, FilterOp::Lt, value.into())
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.compare(column, FilterOp::Lte, value.into())
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.compare(column, FilterOp::Like, Value::String(pattern.to_string()))
    }

    pub fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Filter::new(column, FilterOp::In, FilterValue::Many(values)))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::new(column, FilterOp::IsNull, FilterValue::None))
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.filter(Filter::new(column, FilterOp::IsNotNull, FilterValue::None))
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u32) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    fn column(&self, name: &str) -> Result<&'static Column, AppError> {
        let table: &'static Table = self.table;
        table
            .column(name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown column '{}' on {}", name, table.name)))
    }

    fn where_clause(&self, q: &mut QueryBuf) -> Result<String, AppError> {
        let mut parts = Vec::with_capacity(self.filters.len());
        for f in &self.filters {
            let col = self.column(&f.column)?;
            let qcol = quoted(col.name);
            let part = match (f.op, &f.value) {
                (FilterOp::Eq, FilterValue::One(Value::Null)) => format!("{} IS NULL", qcol),
                (FilterOp::Neq, FilterValue::One(Value::Null)) => format!("{} IS NOT NULL", qcol),
                (op, FilterValue::One(v)) if op.comparison().is_some() => {
                    let n = q.push_param(v.clone());
                    format!("{} {} {}", qcol, op.comparison().unwrap_or("="), col.placeholder(n))
                }
                (FilterOp::Like, FilterValue::One(v)) => {
                    let n = q.push_param(v.clone());
                    format!("{}::text ILIKE ${}", qcol, n)
                }
                (FilterOp::In, FilterValue::Many(values)) => {
                    if values.is_empty() {
                        "FALSE".to_string()
                    } else {
                        let placeholders: Vec<String> = values
                            .iter()
                            .map(|v| col.placeholder(q.push_param(v.clone())))
                            .collect();
                        format!("{} IN ({})", qcol, placeholders.join(", "))
                    }
                }
                (FilterOp::IsNull, _) => format!("{} IS NULL", qcol),
                (FilterOp::IsNotNull, _) => format!("{} IS NOT NULL", qcol),
                (op, _) => {
                    return Err(AppError::BadRequest(format!(
                        "operator {:?} on '{}' has the wrong number of values",
                        op, f.column
                    )))
                }
            };
            parts.push(part);
        }
        Ok(if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        })
    }

    fn projection(&self) -> Result<String, AppError> {
        match &self.columns {
            None => Ok(select_column_list(self.table)),
            Some(cols) => Ok(cols
                .iter()
                .map(|c| self.column(c).map(select_expr))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")),
        }
    }

    /// SELECT with WHERE, ORDER BY, LIMIT (capped at `MAX_LIMIT`) and OFFSET.
    pub fn build_select(&self) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let cols = self.projection()?;
        let where_clause = self.where_clause(&mut q)?;
        let mut order_parts = Vec::with_capacity(self.order.len());
        for (c, d) in &self.order {
            let col = self.column(c)?;
            order_parts.push(format!("{} {}", quoted(col.name), d.sql()));
        }
        let order_clause = if order_parts.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", order_parts.join(", "))
        };
        let limit_clause = self
            .limit
            .map(|n| format!(" LIMIT {}", n.min(MAX_LIMIT)))
            .unwrap_or_default();
        let offset_clause = self.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
        q.sql = format!(
            "SELECT {} FROM {}{}{}{}{}",
            cols,
            self.table.qualified(),
            where_clause,
            order_clause,
            limit_clause,
            offset_clause
        );
        Ok(q)
    }

    pub fn build_count(&self) -> Result<QueryBuf, AppError> {
        let mut q = QueryBuf::new();
        let where_clause = self.where_clause(&mut q)?;
        q.sql = format!(
            "SELECT COUNT(*) AS count FROM {}{}",
            self.table.qualified(),
            where_clause
        );
        Ok(q)
    }

    /// UPDATE ... SET (known, non-pk columns of `data`) WHERE (accumulated filters) RETURNING *.
    /// `updated_at` is stamped when the table has it and `data` does not set it.
    pub fn build_update(&self, data: &Map<String, Value>) -> Result<QueryBuf, AppError> {
        if self.filters.is_empty() {
            return Err(AppError::BadRequest("update requires at least one filter".into()));
        }
        let mut q = QueryBuf::new();
        let mut sets = Vec::new();
        for (k, v) in data {
            if k == self.table.pk {
                continue;
            }
            let Some(col) = self.table.column(k) else { continue };
            let n = q.push_param(v.clone());
            sets.push(format!("{} = {}", quoted(col.name), col.placeholder(n)));
        }
        if sets.is_empty() {
            return Err(AppError::Validation("no updatable fields in body".into()));
        }
        if self.table.has_column("updated_at") && !data.contains_key("updated_at") {
            sets.push(format!("{} = NOW()", quoted("updated_at")));
        }
        let where_clause = self.where_clause(&mut q)?;
        q.sql = format!(
            "UPDATE {} SET {}{} RETURNING {}",
            self.table.qualified(),
            sets.join(", "),
            where_clause,
            select_column_list(self.table)
        );
        Ok(q)
    }

    pub fn build_delete(&self) -> Result<QueryBuf, AppError> {
        if self.filters.is_empty() {
            return Err(AppError::BadRequest("delete requires at least one filter".into()));
        }
        let mut q = QueryBuf::new();
        let where_clause = self.where_clause(&mut q)?;
        q.sql = format!(
            "DELETE FROM {}{} RETURNING {}",
            self.table.qualified(),
            where_clause,
            select_column_list(self.table)
        );
        Ok(q)
    }

    /// Run the SELECT and return every row.
    pub async fn get(&self, db: &Database) -> Result<Vec<Value>, AppError> {
        let q = self.build_select()?;
        db.fetch_all(&q).await
    }

    /// First row per the ordering, or `None` when nothing matches.
    pub async fn single(self, db: &Database) -> Result<Option<Value>, AppError> {
        let q = self.limit(1).build_select()?;
        db.fetch_optional(&q).await
    }

    pub async fn count(&self, db: &Database) -> Result<i64, AppError> {
        let q = self.build_count()?;
        let row = db.fetch_optional(&q).await?;
        Ok(row
            .as_ref()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Update matching rows; returns them as stored after the update.
    pub async fn update(&self, db: &Database, data: &Map<String, Value>) -> Result<Vec<Value>, AppError> {
        let q = self.build_update(data)?;
        db.fetch_all(&q).await
    }

    /// Delete matching rows; returns the deleted rows.
    pub async fn delete(&self, db: &Database) -> Result<Vec<Value>, AppError> {
        let q = self.build_delete()?;
        db.fetch_all(&q).await
    }
}

/// INSERT of the table's columns present in `data`; omitted columns take their DB default.
pub fn insert(table: &Table, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in table.columns {
        let Some(v) = data.get(c.name) else { continue };
        let n = q.push_param(v.clone());
        cols.push(quoted(c.name));
        placeholders.push(c.placeholder(n));
    }
    let returning = select_column_list(table);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table.qualified(), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table.qualified(),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}
