//! Till session repository
//!
//! Database operations for till sessions and their frozen settlement
//! reports. Closing is transactional: the session row update and the report
//! insert either both land or neither does.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    SessionReport, SessionStatus, SettlementTotals, ShiftKind, TillSession,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Till session repository trait
#[async_trait]
pub trait TillSessionRepository: Send + Sync {
    /// Create a new open session, returning it with the assigned id
    async fn create(&self, session: &TillSession) -> Result<TillSession>;

    /// Get session by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<TillSession>>;

    /// The cashier's OPEN session for one shift and business date, if any
    async fn find_open(
        &self,
        cashier_id: i64,
        shift: ShiftKind,
        business_date: NaiveDate,
    ) -> Result<Option<TillSession>>;

    /// The cashier's OPEN session regardless of shift, if any
    async fn find_open_by_cashier(&self, cashier_id: i64) -> Result<Option<TillSession>>;

    /// All OPEN sessions (for the overdue sweep)
    async fn list_open(&self) -> Result<Vec<TillSession>>;

    /// Page of sessions, newest first, optionally restricted to one cashier
    async fn list(&self, cashier_id: Option<i64>, limit: i64, offset: i64)
        -> Result<Vec<TillSession>>;

    /// Total session count for the same filter as `list`
    async fn count(&self, cashier_id: Option<i64>) -> Result<i64>;

    /// Close a session: persist the cash count, totals, and frozen report in
    /// a single transaction.
    async fn close(
        &self,
        id: i64,
        actual_cash: i64,
        notes: Option<&str>,
        totals: &SettlementTotals,
        closed_at: DateTime<Utc>,
        report: &SessionReport,
    ) -> Result<()>;

    /// The frozen report for a closed session
    async fn get_report(&self, session_id: i64) -> Result<Option<SessionReport>>;
}

/// SQLx-based till session repository implementation
pub struct SqlxTillSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxTillSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TillSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "id, cashier_id, shift, business_date, opening_float, status, \
     actual_cash, notes, cash_total, cash_count, card_total, card_count, \
     mobile_total, mobile_count, opened_at, closed_at";

#[async_trait]
impl TillSessionRepository for SqlxTillSessionRepository {
    async fn create(&self, session: &TillSession) -> Result<TillSession> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.as_sqlite().unwrap(), session).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.as_mysql().unwrap(), session).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<TillSession>> {
        let sql = format!("SELECT {} FROM till_sessions WHERE id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get till session")?;
                row.as_ref().map(row_to_session_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get till session")?;
                row.as_ref().map(row_to_session_mysql).transpose()
            }
        }
    }

    async fn find_open(
        &self,
        cashier_id: i64,
        shift: ShiftKind,
        business_date: NaiveDate,
    ) -> Result<Option<TillSession>> {
        let sql = format!(
            "SELECT {} FROM till_sessions \
             WHERE cashier_id = ? AND shift = ? AND business_date = ? AND status = 'open'",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(cashier_id)
                    .bind(shift.to_string())
                    .bind(business_date)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to find open till session")?;
                row.as_ref().map(row_to_session_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(cashier_id)
                    .bind(shift.to_string())
                    .bind(business_date)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to find open till session")?;
                row.as_ref().map(row_to_session_mysql).transpose()
            }
        }
    }

    async fn find_open_by_cashier(&self, cashier_id: i64) -> Result<Option<TillSession>> {
        let sql = format!(
            "SELECT {} FROM till_sessions \
             WHERE cashier_id = ? AND status = 'open' ORDER BY opened_at DESC LIMIT 1",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(cashier_id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to find open till session")?;
                row.as_ref().map(row_to_session_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(cashier_id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to find open till session")?;
                row.as_ref().map(row_to_session_mysql).transpose()
            }
        }
    }

    async fn list_open(&self) -> Result<Vec<TillSession>> {
        let sql = format!(
            "SELECT {} FROM till_sessions WHERE status = 'open' ORDER BY opened_at",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list open till sessions")?;
                rows.iter().map(row_to_session_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list open till sessions")?;
                rows.iter().map(row_to_session_mysql).collect()
            }
        }
    }

    async fn list(
        &self,
        cashier_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TillSession>> {
        let sql = match cashier_id {
            Some(_) => format!(
                "SELECT {} FROM till_sessions WHERE cashier_id = ? \
                 ORDER BY opened_at DESC LIMIT ? OFFSET ?",
                SELECT_COLUMNS
            ),
            None => format!(
                "SELECT {} FROM till_sessions ORDER BY opened_at DESC LIMIT ? OFFSET ?",
                SELECT_COLUMNS
            ),
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                if let Some(id) = cashier_id {
                    query = query.bind(id);
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list till sessions")?;
                rows.iter().map(row_to_session_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                if let Some(id) = cashier_id {
                    query = query.bind(id);
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list till sessions")?;
                rows.iter().map(row_to_session_mysql).collect()
            }
        }
    }

    async fn count(&self, cashier_id: Option<i64>) -> Result<i64> {
        let sql = match cashier_id {
            Some(_) => "SELECT COUNT(*) FROM till_sessions WHERE cashier_id = ?",
            None => "SELECT COUNT(*) FROM till_sessions",
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query_scalar(sql);
                if let Some(id) = cashier_id {
                    query = query.bind(id);
                }
                let count: i64 = query
                    .fetch_one(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to count till sessions")?;
                Ok(count)
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query_scalar(sql);
                if let Some(id) = cashier_id {
                    query = query.bind(id);
                }
                let count: i64 = query
                    .fetch_one(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to count till sessions")?;
                Ok(count)
            }
        }
    }

    async fn close(
        &self,
        id: i64,
        actual_cash: i64,
        notes: Option<&str>,
        totals: &SettlementTotals,
        closed_at: DateTime<Utc>,
        report: &SessionReport,
    ) -> Result<()> {
        let report_json =
            serde_json::to_string(report).context("Failed to serialize session report")?;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                close_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    id,
                    actual_cash,
                    notes,
                    totals,
                    closed_at,
                    &report_json,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                close_mysql(
                    self.pool.as_mysql().unwrap(),
                    id,
                    actual_cash,
                    notes,
                    totals,
                    closed_at,
                    &report_json,
                )
                .await
            }
        }
    }

    async fn get_report(&self, session_id: i64) -> Result<Option<SessionReport>> {
        let sql = "SELECT report FROM session_reports WHERE session_id = ?";
        let json: Option<String> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(session_id)
                .fetch_optional(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to get session report")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(session_id)
                .fetch_optional(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to get session report")?,
        };
        json.map(|j| serde_json::from_str(&j).context("Failed to parse session report"))
            .transpose()
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_sqlite(pool: &SqlitePool, session: &TillSession) -> Result<TillSession> {
    let result = sqlx::query(
        r#"
        INSERT INTO till_sessions
            (cashier_id, shift, business_date, opening_float, status, opened_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.cashier_id)
    .bind(session.shift.to_string())
    .bind(session.business_date)
    .bind(session.opening_float)
    .bind(session.status.to_string())
    .bind(session.opened_at)
    .execute(pool)
    .await
    .context("Failed to create till session")?;

    let mut created = session.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

async fn close_sqlite(
    pool: &SqlitePool,
    id: i64,
    actual_cash: i64,
    notes: Option<&str>,
    totals: &SettlementTotals,
    closed_at: DateTime<Utc>,
    report_json: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(
        r#"
        UPDATE till_sessions
        SET status = 'closed', actual_cash = ?, notes = ?,
            cash_total = ?, cash_count = ?, card_total = ?, card_count = ?,
            mobile_total = ?, mobile_count = ?, closed_at = ?
        WHERE id = ? AND status = 'open'
        "#,
    )
    .bind(actual_cash)
    .bind(notes)
    .bind(totals.cash_total)
    .bind(totals.cash_count)
    .bind(totals.card_total)
    .bind(totals.card_count)
    .bind(totals.mobile_total)
    .bind(totals.mobile_count)
    .bind(closed_at)
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to close till session")?;

    if updated.rows_affected() != 1 {
        anyhow::bail!("Till session {} is not open", id);
    }

    sqlx::query("INSERT INTO session_reports (session_id, report) VALUES (?, ?)")
        .bind(id)
        .bind(report_json)
        .execute(&mut *tx)
        .await
        .context("Failed to store session report")?;

    tx.commit().await.context("Failed to commit close")?;
    Ok(())
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<TillSession> {
    let shift: String = row.get("shift");
    let status: String = row.get("status");
    let cash_total: Option<i64> = row.get("cash_total");
    Ok(TillSession {
        id: row.get("id"),
        cashier_id: row.get("cashier_id"),
        shift: ShiftKind::from_str(&shift)?,
        business_date: row.get("business_date"),
        opening_float: row.get("opening_float"),
        status: SessionStatus::from_str(&status)?,
        actual_cash: row.get("actual_cash"),
        notes: row.get("notes"),
        totals: cash_total.map(|_| SettlementTotals {
            cash_total: row.get::<Option<i64>, _>("cash_total").unwrap_or(0),
            cash_count: row.get::<Option<i64>, _>("cash_count").unwrap_or(0),
            card_total: row.get::<Option<i64>, _>("card_total").unwrap_or(0),
            card_count: row.get::<Option<i64>, _>("card_count").unwrap_or(0),
            mobile_total: row.get::<Option<i64>, _>("mobile_total").unwrap_or(0),
            mobile_count: row.get::<Option<i64>, _>("mobile_count").unwrap_or(0),
        }),
        opened_at: row.get("opened_at"),
        closed_at: row.get("closed_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_mysql(pool: &MySqlPool, session: &TillSession) -> Result<TillSession> {
    let result = sqlx::query(
        r#"
        INSERT INTO till_sessions
            (cashier_id, shift, business_date, opening_float, status, opened_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.cashier_id)
    .bind(session.shift.to_string())
    .bind(session.business_date)
    .bind(session.opening_float)
    .bind(session.status.to_string())
    .bind(session.opened_at)
    .execute(pool)
    .await
    .context("Failed to create till session")?;

    let mut created = session.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

async fn close_mysql(
    pool: &MySqlPool,
    id: i64,
    actual_cash: i64,
    notes: Option<&str>,
    totals: &SettlementTotals,
    closed_at: DateTime<Utc>,
    report_json: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(
        r#"
        UPDATE till_sessions
        SET status = 'closed', actual_cash = ?, notes = ?,
            cash_total = ?, cash_count = ?, card_total = ?, card_count = ?,
            mobile_total = ?, mobile_count = ?, closed_at = ?
        WHERE id = ? AND status = 'open'
        "#,
    )
    .bind(actual_cash)
    .bind(notes)
    .bind(totals.cash_total)
    .bind(totals.cash_count)
    .bind(totals.card_total)
    .bind(totals.card_count)
    .bind(totals.mobile_total)
    .bind(totals.mobile_count)
    .bind(closed_at)
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to close till session")?;

    if updated.rows_affected() != 1 {
        anyhow::bail!("Till session {} is not open", id);
    }

    sqlx::query("INSERT INTO session_reports (session_id, report) VALUES (?, ?)")
        .bind(id)
        .bind(report_json)
        .execute(&mut *tx)
        .await
        .context("Failed to store session report")?;

    tx.commit().await.context("Failed to commit close")?;
    Ok(())
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<TillSession> {
    let shift: String = row.get("shift");
    let status: String = row.get("status");
    let cash_total: Option<i64> = row.get("cash_total");
    Ok(TillSession {
        id: row.get("id"),
        cashier_id: row.get("cashier_id"),
        shift: ShiftKind::from_str(&shift)?,
        business_date: row.get("business_date"),
        opening_float: row.get("opening_float"),
        status: SessionStatus::from_str(&status)?,
        actual_cash: row.get("actual_cash"),
        notes: row.get("notes"),
        totals: cash_total.map(|_| SettlementTotals {
            cash_total: row.get::<Option<i64>, _>("cash_total").unwrap_or(0),
            cash_count: row.get::<Option<i64>, _>("cash_count").unwrap_or(0),
            card_total: row.get::<Option<i64>, _>("card_total").unwrap_or(0),
            card_count: row.get::<Option<i64>, _>("card_count").unwrap_or(0),
            mobile_total: row.get::<Option<i64>, _>("mobile_total").unwrap_or(0),
            mobile_count: row.get::<Option<i64>, _>("mobile_count").unwrap_or(0),
        }),
        opened_at: row.get("opened_at"),
        closed_at: row.get("closed_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::UserRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{CashVariance, User, UserRole};

    async fn setup() -> (DynDatabasePool, SqlxTillSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = super::super::user::SqlxUserRepository::new(pool.clone());
        let cashier = users
            .create(&User::new(
                "anna".to_string(),
                "hash".to_string(),
                UserRole::Cashier,
            ))
            .await
            .expect("Failed to create cashier");
        let repo = SqlxTillSessionRepository::new(pool.clone());
        (pool, repo, cashier.id)
    }

    fn open_session(cashier_id: i64, shift: ShiftKind, date: NaiveDate) -> TillSession {
        TillSession {
            id: 0,
            cashier_id,
            shift,
            business_date: date,
            opening_float: 100_000,
            status: SessionStatus::Open,
            actual_cash: None,
            notes: None,
            totals: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn report_for(session: &TillSession, totals: SettlementTotals, actual: i64) -> SessionReport {
        SessionReport {
            session_id: session.id,
            cashier_id: session.cashier_id,
            cashier_name: "anna".to_string(),
            shift: session.shift,
            business_date: session.business_date,
            weekday: "Monday".to_string(),
            opening_float: session.opening_float,
            totals,
            reconciliation: CashVariance::compute(
                session.opening_float,
                totals.cash_total,
                actual,
                100,
                5000,
            ),
            notes: None,
            closed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_open() {
        let (_pool, repo, cashier_id) = setup().await;
        let created = repo
            .create(&open_session(cashier_id, ShiftKind::Morning, date(2025, 3, 10)))
            .await
            .expect("Failed to create session");
        assert!(created.id > 0);

        let found = repo
            .find_open(cashier_id, ShiftKind::Morning, date(2025, 3, 10))
            .await
            .expect("Failed to find")
            .expect("Open session not found");
        assert_eq!(found.id, created.id);
        assert_eq!(found.opening_float, 100_000);
        assert!(found.totals.is_none());

        // Different shift or date finds nothing
        assert!(repo
            .find_open(cashier_id, ShiftKind::Night, date(2025, 3, 10))
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .find_open(cashier_id, ShiftKind::Morning, date(2025, 3, 11))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_close_persists_totals_and_report() {
        let (_pool, repo, cashier_id) = setup().await;
        let session = repo
            .create(&open_session(cashier_id, ShiftKind::Morning, date(2025, 3, 10)))
            .await
            .unwrap();

        let mut totals = SettlementTotals::default();
        totals.record(crate::models::PaymentMethod::Cash, 50_000);
        totals.record(crate::models::PaymentMethod::Card, 30_000);
        let report = report_for(&session, totals, 150_000);

        repo.close(session.id, 150_000, Some("all good"), &totals, Utc::now(), &report)
            .await
            .expect("Failed to close session");

        let closed = repo
            .get_by_id(session.id)
            .await
            .unwrap()
            .expect("Session not found");
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.actual_cash, Some(150_000));
        assert_eq!(closed.notes.as_deref(), Some("all good"));
        let stored = closed.totals.expect("Totals missing");
        assert_eq!(stored.cash_total, 50_000);
        assert_eq!(stored.card_total, 30_000);
        assert!(closed.closed_at.is_some());

        let stored_report = repo
            .get_report(session.id)
            .await
            .unwrap()
            .expect("Report missing");
        assert_eq!(stored_report.session_id, session.id);
        assert_eq!(stored_report.reconciliation.variance, 0);

        // No longer discoverable as open
        assert!(repo
            .find_open(cashier_id, ShiftKind::Morning, date(2025, 3, 10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let (_pool, repo, cashier_id) = setup().await;
        let session = repo
            .create(&open_session(cashier_id, ShiftKind::Morning, date(2025, 3, 10)))
            .await
            .unwrap();

        let totals = SettlementTotals::default();
        let report = report_for(&session, totals, 100_000);
        repo.close(session.id, 100_000, None, &totals, Utc::now(), &report)
            .await
            .expect("First close should succeed");

        let result = repo
            .close(session.id, 100_000, None, &totals, Utc::now(), &report)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_report_missing_until_closed() {
        let (_pool, repo, cashier_id) = setup().await;
        let session = repo
            .create(&open_session(cashier_id, ShiftKind::Afternoon, date(2025, 3, 10)))
            .await
            .unwrap();

        assert!(repo.get_report(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_count_pagination() {
        let (_pool, repo, cashier_id) = setup().await;
        for day in 1..=5 {
            repo.create(&open_session(cashier_id, ShiftKind::Morning, date(2025, 3, day)))
                .await
                .unwrap();
        }

        assert_eq!(repo.count(Some(cashier_id)).await.unwrap(), 5);
        assert_eq!(repo.count(None).await.unwrap(), 5);
        assert_eq!(repo.count(Some(cashier_id + 1)).await.unwrap(), 0);

        let page = repo.list(Some(cashier_id), 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        let rest = repo.list(Some(cashier_id), 10, 4).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn test_list_open_for_sweep() {
        let (_pool, repo, cashier_id) = setup().await;
        let s1 = repo
            .create(&open_session(cashier_id, ShiftKind::Morning, date(2025, 3, 10)))
            .await
            .unwrap();
        repo.create(&open_session(cashier_id, ShiftKind::Afternoon, date(2025, 3, 10)))
            .await
            .unwrap();

        let totals = SettlementTotals::default();
        let report = report_for(&s1, totals, 100_000);
        repo.close(s1.id, 100_000, None, &totals, Utc::now(), &report)
            .await
            .unwrap();

        let open = repo.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].shift, ShiftKind::Afternoon);
    }
}
