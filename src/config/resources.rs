//! Resource descriptors: one per REST path, driving the generic entity handlers.

use crate::auth::Role;
use crate::sql::{Direction, Table};
use crate::store;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

/// Who may perform an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    Role(Role),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Exact,
    /// Applied only when the query parameter is `true`; the column is compared to boolean true.
    FlagTrue,
}

/// Query-string parameter mapped to a column predicate on list.
#[derive(Clone, Copy, Debug)]
pub struct QueryFilter {
    pub param: &'static str,
    pub column: &'static str,
    pub kind: FilterKind,
}

impl QueryFilter {
    pub const fn exact(column: &'static str) -> Self {
        QueryFilter {
            param: column,
            column,
            kind: FilterKind::Exact,
        }
    }

    pub const fn renamed(param: &'static str, column: &'static str) -> Self {
        QueryFilter {
            param,
            column,
            kind: FilterKind::Exact,
        }
    }

    pub const fn flag(param: &'static str, column: &'static str) -> Self {
        QueryFilter {
            param,
            column,
            kind: FilterKind::FlagTrue,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Email,
    Uuid,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM` or `HH:MM:SS`
    Time,
}

/// Per-column validation.
#[derive(Clone, Copy, Debug)]
pub struct FieldRule {
    pub column: &'static str,
    pub required: bool,
    pub format: Option<Format>,
    pub allowed: &'static [&'static str],
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub max_length: Option<usize>,
}

impl FieldRule {
    pub const fn optional(column: &'static str) -> Self {
        FieldRule {
            column,
            required: false,
            format: None,
            allowed: &[],
            min: None,
            max: None,
            max_length: None,
        }
    }

    pub const fn required(column: &'static str) -> Self {
        let mut rule = FieldRule::optional(column);
        rule.required = true;
        rule
    }

    pub const fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub const fn at_least(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub const fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }
}

/// Value a column takes on create when the body omits it.
#[derive(Clone, Copy, Debug)]
pub enum DefaultValue {
    Text(&'static str),
    Number(i64),
    Bool(bool),
}

impl DefaultValue {
    pub fn to_json(self) -> Value {
        match self {
            DefaultValue::Text(s) => Value::String(s.to_string()),
            DefaultValue::Number(n) => Value::Number(n.into()),
            DefaultValue::Bool(b) => Value::Bool(b),
        }
    }
}

/// Resource-specific behaviour on top of plain CRUD.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteRules {
    Plain,
    /// Reject double booking of a doctor's slot.
    Appointments,
    /// Keep `remaining_from_patient` equal to total minus paid.
    Financials,
    /// Stamp `completed_date` when status becomes completed.
    PatientServices,
}

#[derive(Debug)]
pub struct Resource {
    /// URL segment under `/api`.
    pub path: &'static str,
    pub table: &'static Table,
    pub operations: &'static [Operation],
    /// Operations that require the admin role; everything else is public.
    pub admin_only: &'static [Operation],
    pub filters: &'static [QueryFilter],
    pub order: &'static [(&'static str, Direction)],
    pub rules: &'static [FieldRule],
    pub defaults: &'static [(&'static str, DefaultValue)],
    pub write_rules: WriteRules,
}

impl Resource {
    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn access(&self, op: Operation) -> Access {
        if self.admin_only.contains(&op) {
            Access::Role(Role::Admin)
        } else {
            Access::Public
        }
    }

    pub fn rule(&self, column: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.column == column)
    }
}

const ALL_OPERATIONS: &[Operation] = &[
    Operation::List,
    Operation::Read,
    Operation::Create,
    Operation::Update,
    Operation::Delete,
];

const WRITES: &[Operation] = &[Operation::Create, Operation::Update, Operation::Delete];

const CREATED_DESC: &[(&str, Direction)] = &[("created_at", Direction::Desc)];
const NAME_ASC: &[(&str, Direction)] = &[("name", Direction::Asc)];

pub static RESOURCES: &[Resource] = &[
    Resource {
        path: "patients",
        table: &store::PATIENTS,
        operations: ALL_OPERATIONS,
        admin_only: &[],
        filters: &[QueryFilter::exact("status"), QueryFilter::exact("email")],
        order: CREATED_DESC,
        rules: &[
            FieldRule::required("name").max_length(200),
            FieldRule::required("email").format(Format::Email),
            FieldRule::required("phone").max_length(50),
            FieldRule::optional("date_of_birth").format(Format::Date),
            FieldRule::optional("status").one_of(&["active", "inactive"]),
        ],
        defaults: &[("status", DefaultValue::Text("active"))],
        write_rules: WriteRules::Plain,
    },
    Resource {
        path: "appointments",
        table: &store::APPOINTMENTS,
        operations: ALL_OPERATIONS,
        admin_only: &[],
        filters: &[
            QueryFilter::exact("patient_id"),
            QueryFilter::exact("status"),
            QueryFilter::renamed("date", "appointment_date"),
            QueryFilter::exact("doctor"),
        ],
        order: &[
            ("appointment_date", Direction::Asc),
            ("appointment_time", Direction::Asc),
        ],
        rules: &[
            FieldRule::optional("patient_id").format(Format::Uuid),
            FieldRule::required("appointment_date").format(Format::Date),
            FieldRule::required("appointment_time").format(Format::Time),
            FieldRule::required("doctor"),
            FieldRule::required("service_type"),
            FieldRule::optional("status").one_of(&["scheduled", "confirmed", "completed", "cancelled", "no-show"]),
        ],
        defaults: &[("status", DefaultValue::Text("scheduled"))],
        write_rules: WriteRules::Appointments,
    },
    Resource {
        path: "doctors",
        table: &store::DOCTORS,
        operations: ALL_OPERATIONS,
        admin_only: WRITES,
        filters: &[QueryFilter::flag("active", "is_active")],
        order: NAME_ASC,
        rules: &[
            FieldRule::required("name"),
            FieldRule::optional("email").format(Format::Email),
        ],
        defaults: &[("is_active", DefaultValue::Bool(true))],
        write_rules: WriteRules::Plain,
    },
    Resource {
        path: "services",
        table: &store::SERVICES,
        operations: ALL_OPERATIONS,
        admin_only: WRITES,
        filters: &[QueryFilter::exact("category")],
        order: NAME_ASC,
        rules: &[
            FieldRule::required("name"),
            FieldRule::optional("default_cost").at_least(0),
        ],
        defaults: &[
            ("category", DefaultValue::Text("general")),
            ("default_cost", DefaultValue::Number(0)),
        ],
        write_rules: WriteRules::Plain,
    },
    Resource {
        path: "patient-services",
        table: &store::PATIENT_SERVICES,
        operations: ALL_OPERATIONS,
        admin_only: &[],
        filters: &[QueryFilter::exact("patient_id"), QueryFilter::exact("status")],
        order: CREATED_DESC,
        rules: &[
            FieldRule::required("patient_id").format(Format::Uuid),
            FieldRule::required("service_id").format(Format::Uuid),
            FieldRule::optional("assigned_cost").at_least(0),
            FieldRule::optional("scheduled_date").format(Format::Date),
            FieldRule::optional("completed_date").format(Format::Date),
            FieldRule::optional("status").one_of(&["pending", "in_progress", "completed", "cancelled"]),
        ],
        defaults: &[
            ("status", DefaultValue::Text("pending")),
            ("assigned_cost", DefaultValue::Number(0)),
        ],
        write_rules: WriteRules::PatientServices,
    },
    Resource {
        path: "financials",
        table: &store::PATIENT_FINANCIALS,
        operations: ALL_OPERATIONS,
        admin_only: &[],
        filters: &[QueryFilter::exact("patient_id")],
        order: &[("updated_at", Direction::Desc)],
        rules: &[
            FieldRule::required("patient_id").format(Format::Uuid),
            FieldRule::optional("total_treatment_cost").at_least(0),
            FieldRule::optional("amount_paid_by_patient").at_least(0),
            FieldRule::optional("amount_due_to_doctor").at_least(0),
        ],
        defaults: &[("amount_due_to_doctor", DefaultValue::Number(0))],
        write_rules: WriteRules::Financials,
    },
    Resource {
        path: "treatments",
        table: &store::TREATMENTS,
        operations: ALL_OPERATIONS,
        admin_only: &[],
        filters: &[
            QueryFilter::exact("patient_id"),
            QueryFilter::exact("appointment_id"),
            QueryFilter::exact("status"),
        ],
        order: CREATED_DESC,
        rules: &[
            FieldRule::optional("patient_id").format(Format::Uuid),
            FieldRule::optional("appointment_id").format(Format::Uuid),
            FieldRule::required("treatment_type"),
            FieldRule::optional("cost").at_least(0),
            FieldRule::optional("status").one_of(&["planned", "in-progress", "completed"]),
        ],
        defaults: &[("status", DefaultValue::Text("planned"))],
        write_rules: WriteRules::Plain,
    },
    Resource {
        path: "feedback",
        table: &store::FEEDBACK,
        operations: &[Operation::List, Operation::Read, Operation::Create, Operation::Update],
        admin_only: &[Operation::Update],
        filters: &[QueryFilter::exact("status"), QueryFilter::exact("category")],
        order: CREATED_DESC,
        rules: &[
            FieldRule::optional("patient_id").format(Format::Uuid),
            FieldRule::required("patient_name"),
            FieldRule::required("patient_email").format(Format::Email),
            FieldRule::required("rating").range(1, 5),
            FieldRule::required("message").max_length(5000),
            FieldRule::optional("status").one_of(&["new", "reviewed"]),
        ],
        defaults: &[
            ("status", DefaultValue::Text("new")),
            ("category", DefaultValue::Text("general")),
        ],
        write_rules: WriteRules::Plain,
    },
];

pub fn resource_by_path(path: &str) -> Option<&'static Resource> {
    RESOURCES.iter().find(|r| r.path == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_only_name_real_columns() {
        for r in RESOURCES {
            for f in r.filters {
                assert!(r.table.has_column(f.column), "{}: filter {}", r.path, f.column);
            }
            for (c, _) in r.order {
                assert!(r.table.has_column(c), "{}: order {}", r.path, c);
            }
            for rule in r.rules {
                assert!(r.table.has_column(rule.column), "{}: rule {}", r.path, rule.column);
            }
            for (c, _) in r.defaults {
                assert!(r.table.has_column(c), "{}: default {}", r.path, c);
            }
        }
    }

    #[test]
    fn feedback_has_no_delete_and_admin_only_update() {
        let fb = resource_by_path("feedback").unwrap();
        assert!(!fb.allows(Operation::Delete));
        assert_eq!(fb.access(Operation::Create), Access::Public);
        assert_eq!(fb.access(Operation::Update), Access::Role(Role::Admin));
    }

    #[test]
    fn doctor_and_service_writes_need_admin() {
        for path in ["doctors", "services"] {
            let r = resource_by_path(path).unwrap();
            assert_eq!(r.access(Operation::List), Access::Public);
            for op in [Operation::Create, Operation::Update, Operation::Delete] {
                assert_eq!(r.access(op), Access::Role(Role::Admin), "{} {:?}", path, op);
            }
        }
    }

    #[test]
    fn unknown_path_is_none() {
        assert!(resource_by_path("invoices").is_none());
        assert_eq!(resource_by_path("patient-services").unwrap().table.name, "patient_services");
        assert_eq!(resource_by_path("financials").unwrap().table.name, "patient_financials");
    }
}
