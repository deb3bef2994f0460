//! Shift schedule repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ShiftAssignment, ShiftKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Schedule repository trait
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Assign a cashier to a shift; idempotent per (cashier, date, shift)
    async fn assign(&self, cashier_id: i64, date: NaiveDate, shift: ShiftKind) -> Result<ShiftAssignment>;

    /// Look up a cashier's assignment for one date and shift
    async fn get(
        &self,
        cashier_id: i64,
        date: NaiveDate,
        shift: ShiftKind,
    ) -> Result<Option<ShiftAssignment>>;

    /// All assignments for one date
    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<ShiftAssignment>>;
}

/// SQLx-based schedule repository implementation
pub struct SqlxScheduleRepository {
    pool: DynDatabasePool,
}

impl SqlxScheduleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ScheduleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ScheduleRepository for SqlxScheduleRepository {
    async fn assign(
        &self,
        cashier_id: i64,
        date: NaiveDate,
        shift: ShiftKind,
    ) -> Result<ShiftAssignment> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.as_sqlite().unwrap();
                sqlx::query(
                    "INSERT OR IGNORE INTO shift_assignments (cashier_id, date, shift) VALUES (?, ?, ?)",
                )
                .bind(cashier_id)
                .bind(date)
                .bind(shift.to_string())
                .execute(pool)
                .await
                .context("Failed to assign shift")?;
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.as_mysql().unwrap();
                sqlx::query(
                    "INSERT IGNORE INTO shift_assignments (cashier_id, date, shift) VALUES (?, ?, ?)",
                )
                .bind(cashier_id)
                .bind(date)
                .bind(shift.to_string())
                .execute(pool)
                .await
                .context("Failed to assign shift")?;
            }
        }

        self.get(cashier_id, date, shift)
            .await?
            .context("Assignment missing after insert")
    }

    async fn get(
        &self,
        cashier_id: i64,
        date: NaiveDate,
        shift: ShiftKind,
    ) -> Result<Option<ShiftAssignment>> {
        let sql = "SELECT id, cashier_id, date, shift, created_at FROM shift_assignments \
                   WHERE cashier_id = ? AND date = ? AND shift = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(cashier_id)
                    .bind(date)
                    .bind(shift.to_string())
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get shift assignment")?;
                row.as_ref().map(row_to_assignment_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(cashier_id)
                    .bind(date)
                    .bind(shift.to_string())
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get shift assignment")?;
                row.as_ref().map(row_to_assignment_mysql).transpose()
            }
        }
    }

    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<ShiftAssignment>> {
        let sql = "SELECT id, cashier_id, date, shift, created_at FROM shift_assignments \
                   WHERE date = ? ORDER BY shift, cashier_id";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(date)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list shift assignments")?;
                rows.iter().map(row_to_assignment_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(date)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list shift assignments")?;
                rows.iter().map(row_to_assignment_mysql).collect()
            }
        }
    }
}

fn row_to_assignment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ShiftAssignment> {
    let shift: String = row.get("shift");
    Ok(ShiftAssignment {
        id: row.get("id"),
        cashier_id: row.get("cashier_id"),
        date: row.get("date"),
        shift: ShiftKind::from_str(&shift)?,
        created_at: row.get("created_at"),
    })
}

fn row_to_assignment_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ShiftAssignment> {
    let shift: String = row.get("shift");
    Ok(ShiftAssignment {
        id: row.get("id"),
        cashier_id: row.get("cashier_id"),
        date: row.get("date"),
        shift: ShiftKind::from_str(&shift)?,
        created_at: row.get("created_at"),
    })
}
