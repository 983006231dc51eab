//! Static table descriptors. Every identifier that reaches SQL text comes from here.

use serde_json::Value;

/// One column: name plus the PostgreSQL type used to cast bound parameters.
#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    /// Cast applied to placeholders (`$n::date`). `None` is a plain text column.
    pub pg_type: Option<&'static str>,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Column { name, pg_type: None }
    }

    pub const fn typed(name: &'static str, pg_type: &'static str) -> Self {
        Column {
            name,
            pg_type: Some(pg_type),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.pg_type, Some("numeric"))
    }

    /// Whether a JSON body value has the right shape for this column. Null always passes;
    /// NOT NULL is left to the database. Numeric columns also take numeric strings from forms.
    pub fn accepts(&self, v: &Value) -> bool {
        match (self.pg_type, v) {
            (_, Value::Null) => true,
            (Some("boolean"), v) => v.is_boolean(),
            (Some("numeric" | "int4" | "int8"), Value::Number(_)) => true,
            (Some("numeric" | "int4" | "int8"), Value::String(s)) => s.trim().parse::<f64>().is_ok(),
            (Some("numeric" | "int4" | "int8"), _) => false,
            (_, v) => v.is_string(),
        }
    }

    /// JSON type named in validation messages.
    pub fn expected(&self) -> &'static str {
        match self.pg_type {
            Some("boolean") => "a boolean",
            Some("numeric" | "int4" | "int8") => "a number",
            _ => "a string",
        }
    }

    /// Placeholder for parameter `n`, with the column's cast if any.
    pub fn placeholder(&self, n: u32) -> String {
        match self.pg_type {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub pk: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn qualified(&self) -> String {
        quoted(self.name)
    }
}

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Projection for one column: numeric as float8 so rows decode to JSON numbers.
pub fn select_expr(col: &Column) -> String {
    let q = quoted(col.name);
    if col.is_numeric() {
        format!("{}::float8 AS {}", q, q)
    } else {
        q
    }
}

pub fn select_column_list(table: &Table) -> String {
    table
        .columns
        .iter()
        .map(select_expr)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_types_gate_json_shapes() {
        let flag = Column::typed("is_active", "boolean");
        assert!(flag.accepts(&json!(false)));
        assert!(!flag.accepts(&json!("false")));
        assert_eq!(flag.placeholder(3), "$3::boolean");

        let doctor = Column::text("doctor");
        assert!(doctor.accepts(&json!("Dr. Patel")));
        assert!(!doctor.accepts(&json!(5)));
        assert!(doctor.accepts(&Value::Null));

        let cost = Column::typed("cost", "numeric");
        assert!(cost.accepts(&json!(12.5)));
        assert!(cost.accepts(&json!("12.50")));
        assert!(!cost.accepts(&json!("twelve")));
        assert!(!cost.accepts(&json!(true)));

        assert!(!Column::typed("appointment_date", "date").accepts(&json!(20240701)));
    }
}
