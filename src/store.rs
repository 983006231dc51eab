//! Table descriptors and schema bootstrap. DDL is idempotent and runs at startup.

use crate::error::AppError;
use crate::sql::{Column, Table};
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

pub static PATIENTS: Table = Table {
    name: "patients",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::text("name"),
        Column::text("email"),
        Column::text("phone"),
        Column::typed("date_of_birth", "date"),
        Column::text("address"),
        Column::text("medical_history"),
        Column::text("insurance_info"),
        Column::text("status"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static APPOINTMENTS: Table = Table {
    name: "appointments",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("patient_id", "uuid"),
        Column::typed("appointment_date", "date"),
        Column::typed("appointment_time", "time"),
        Column::text("doctor"),
        Column::text("service_type"),
        Column::text("notes"),
        Column::text("status"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static DOCTORS: Table = Table {
    name: "doctors",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::text("name"),
        Column::text("specialty"),
        Column::text("email"),
        Column::text("phone"),
        Column::typed("is_active", "boolean"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static SERVICES: Table = Table {
    name: "services",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::text("name"),
        Column::text("description"),
        Column::text("category"),
        Column::typed("default_cost", "numeric"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static PATIENT_SERVICES: Table = Table {
    name: "patient_services",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("patient_id", "uuid"),
        Column::typed("service_id", "uuid"),
        Column::typed("assigned_cost", "numeric"),
        Column::typed("scheduled_date", "date"),
        Column::typed("completed_date", "date"),
        Column::text("status"),
        Column::text("notes"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static PATIENT_FINANCIALS: Table = Table {
    name: "patient_financials",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("patient_id", "uuid"),
        Column::typed("total_treatment_cost", "numeric"),
        Column::typed("amount_paid_by_patient", "numeric"),
        Column::typed("remaining_from_patient", "numeric"),
        Column::typed("amount_due_to_doctor", "numeric"),
        Column::text("notes"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static TREATMENTS: Table = Table {
    name: "treatments",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("patient_id", "uuid"),
        Column::typed("appointment_id", "uuid"),
        Column::text("treatment_type"),
        Column::text("description"),
        Column::typed("cost", "numeric"),
        Column::text("status"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static FEEDBACK: Table = Table {
    name: "feedback",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("patient_id", "uuid"),
        Column::text("patient_name"),
        Column::text("patient_email"),
        Column::typed("rating", "int4"),
        Column::text("message"),
        Column::text("category"),
        Column::text("status"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static USERS: Table = Table {
    name: "users",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::text("email"),
        Column::text("password_hash"),
        Column::typed("email_verified", "boolean"),
        Column::typed("last_sign_in", "timestamptz"),
        Column::typed("created_at", "timestamptz"),
        Column::typed("updated_at", "timestamptz"),
    ],
};

pub static USER_ROLES: Table = Table {
    name: "user_roles",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("user_id", "uuid"),
        Column::text("role"),
        Column::typed("created_at", "timestamptz"),
    ],
};

pub static USER_SESSIONS: Table = Table {
    name: "user_sessions",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("user_id", "uuid"),
        Column::text("token_hash"),
        Column::text("ip_address"),
        Column::text("user_agent"),
        Column::typed("expires_at", "timestamptz"),
        Column::typed("created_at", "timestamptz"),
    ],
};

pub static PASSWORD_RESETS: Table = Table {
    name: "password_resets",
    pk: "id",
    columns: &[
        Column::typed("id", "uuid"),
        Column::typed("user_id", "uuid"),
        Column::text("token_hash"),
        Column::typed("expires_at", "timestamptz"),
        Column::typed("created_at", "timestamptz"),
    ],
};

/// DDL in dependency order. Every statement is safe to re-run.
const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS pgcrypto",
    r#"
    CREATE TABLE IF NOT EXISTS patients (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        date_of_birth DATE,
        address TEXT,
        medical_history TEXT,
        insurance_info TEXT,
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS appointments (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        patient_id UUID REFERENCES patients (id) ON DELETE SET NULL,
        appointment_date DATE NOT NULL,
        appointment_time TIME NOT NULL,
        doctor TEXT NOT NULL,
        service_type TEXT NOT NULL,
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'scheduled'
            CHECK (status IN ('scheduled', 'confirmed', 'completed', 'cancelled', 'no-show')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS appointments_active_slot_key
        ON appointments (appointment_date, appointment_time, doctor)
        WHERE status <> 'cancelled'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doctors (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        specialty TEXT,
        email TEXT,
        phone TEXT,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS services (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL DEFAULT 'general',
        default_cost NUMERIC(12, 2) NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patient_services (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        patient_id UUID NOT NULL REFERENCES patients (id) ON DELETE CASCADE,
        service_id UUID NOT NULL REFERENCES services (id),
        assigned_cost NUMERIC(12, 2) NOT NULL DEFAULT 0,
        scheduled_date DATE,
        completed_date DATE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'in_progress', 'completed', 'cancelled')),
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patient_financials (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        patient_id UUID NOT NULL REFERENCES patients (id) ON DELETE CASCADE,
        total_treatment_cost NUMERIC(12, 2) NOT NULL DEFAULT 0,
        amount_paid_by_patient NUMERIC(12, 2) NOT NULL DEFAULT 0,
        remaining_from_patient NUMERIC(12, 2) NOT NULL DEFAULT 0,
        amount_due_to_doctor NUMERIC(12, 2) NOT NULL DEFAULT 0,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS treatments (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        patient_id UUID REFERENCES patients (id) ON DELETE SET NULL,
        appointment_id UUID REFERENCES appointments (id) ON DELETE SET NULL,
        treatment_type TEXT NOT NULL,
        description TEXT,
        cost NUMERIC(12, 2),
        status TEXT NOT NULL DEFAULT 'planned' CHECK (status IN ('planned', 'in-progress', 'completed')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feedback (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        patient_id UUID REFERENCES patients (id) ON DELETE SET NULL,
        patient_name TEXT NOT NULL,
        patient_email TEXT NOT NULL,
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        message TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT 'general',
        status TEXT NOT NULL DEFAULT 'new' CHECK (status IN ('new', 'reviewed')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        email_verified BOOLEAN NOT NULL DEFAULT FALSE,
        last_sign_in TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        role TEXT NOT NULL CHECK (role IN ('admin', 'doctor', 'staff', 'patient')),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, role)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_sessions (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        token_hash TEXT NOT NULL UNIQUE,
        ip_address TEXT,
        user_agent TEXT,
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS password_resets (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        token_hash TEXT NOT NULL UNIQUE,
        expires_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS user_sessions_user_id_idx ON user_sessions (user_id)",
    "CREATE INDEX IF NOT EXISTS appointments_patient_id_idx ON appointments (patient_id)",
];

/// Create tables, indexes and constraints if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!(statements = SCHEMA.len(), "schema ensured");
    Ok(())
}

/// Connect to the `postgres` maintenance DB and create the target database if it does not exist.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::BadRequest(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", crate::sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::BadRequest("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut parts = path_and_query.splitn(2, '?');
    let db_name = parts.next().unwrap_or("").trim();
    let query = parts.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres{}", base, query), db_name.to_string()))
}
