//! SQLite-backed persistence (spec §6): the single relational store every
//! other component is handed explicitly rather than reaching into a
//! process-wide singleton.

mod calculations;
mod files;
mod materials;
mod plans;
mod properties;
mod workflows;

use crate::error::MaceResult;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

/// The persistent store. Cloning is cheap — it wraps a pooled connection
/// handle, matching the reference architecture's `SqliteStore`.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> MaceResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> MaceResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn shared(database_url: &str) -> MaceResult<Arc<Self>> {
        Ok(Arc::new(Self::connect(database_url).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> MaceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS materials (
                id              TEXT PRIMARY KEY,
                formula         TEXT,
                space_group     INTEGER,
                dimensionality  INTEGER,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_plans (
                id                  INTEGER PRIMARY KEY,
                input_type          TEXT NOT NULL,
                sequence_json       TEXT NOT NULL,
                execution_settings  TEXT NOT NULL,
                created_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id                  TEXT PRIMARY KEY,
                plan_id             INTEGER NOT NULL,
                materials_json      TEXT NOT NULL,
                status              TEXT NOT NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                FOREIGN KEY (plan_id) REFERENCES workflow_plans(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_states (
                workflow_id     TEXT NOT NULL,
                material_id     TEXT NOT NULL,
                max_step_index  INTEGER NOT NULL,
                PRIMARY KEY (workflow_id, material_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calculations (
                id              TEXT PRIMARY KEY,
                material_id     TEXT NOT NULL,
                workflow_id     TEXT NOT NULL,
                step_index      INTEGER NOT NULL,
                calc_type       TEXT NOT NULL,
                status          TEXT NOT NULL,
                job_id          TEXT,
                attempt         INTEGER NOT NULL,
                config_json     TEXT NOT NULL,
                parents_json    TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                submitted_at    TEXT,
                running_at      TEXT,
                completed_at    TEXT,
                failed_at       TEXT,
                error_kind      TEXT,
                UNIQUE(material_id, workflow_id, step_index, attempt)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calc_material ON calculations(material_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calc_workflow_step ON calculations(workflow_id, step_index)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calc_status_created ON calculations(status, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_calc_job ON calculations(job_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id              TEXT PRIMARY KEY,
                calc_id         TEXT NOT NULL,
                path            TEXT NOT NULL,
                kind            TEXT NOT NULL,
                content_hash    TEXT NOT NULL,
                size            INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                UNIQUE(path, content_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_calc ON files(calc_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS properties (
                id          TEXT PRIMARY KEY,
                calc_id     TEXT NOT NULL,
                name        TEXT NOT NULL,
                value_json  TEXT NOT NULL,
                unit        TEXT,
                category    TEXT NOT NULL,
                inherited   INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_properties_calc ON properties(calc_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS input_settings (
                calc_id     TEXT PRIMARY KEY,
                method      TEXT,
                basis       TEXT,
                tolerances  TEXT,
                k_points    TEXT,
                functional  TEXT,
                dispersion  INTEGER NOT NULL,
                opt_flags   TEXT,
                k_path      TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub use calculations::*;
pub use files::*;
pub use materials::*;
pub use plans::*;
pub use properties::*;
pub use workflows::*;
