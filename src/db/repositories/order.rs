//! Order repository
//!
//! Database operations for orders, including the two aggregate queries the
//! closing flow depends on: unsettled orders for a session, and settlement
//! totals grouped by payment method.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Order, OrderStatus, PaymentMethod, SettlementTotals};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Filters for listing orders
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub session_id: Option<i64>,
    pub status: Option<OrderStatus>,
}

/// Order repository trait
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Create a new open order, returning it with the assigned id
    async fn create(&self, order: &Order) -> Result<Order>;

    /// Get order by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Mark an open order settled with the given payment method
    async fn settle(
        &self,
        id: i64,
        method: PaymentMethod,
        settled_at: DateTime<Utc>,
    ) -> Result<Order>;

    /// Unsettled orders for a till session, oldest first
    async fn unsettled_for_session(&self, session_id: i64) -> Result<Vec<Order>>;

    /// Settlement totals for a till session, grouped by payment method
    async fn settlement_totals(&self, session_id: i64) -> Result<SettlementTotals>;

    /// Page of orders matching the filter, newest first
    async fn list(&self, filter: OrderFilter, limit: i64, offset: i64) -> Result<Vec<Order>>;

    /// Total order count for the same filter as `list`
    async fn count(&self, filter: OrderFilter) -> Result<i64>;
}

/// SQLx-based order repository implementation
pub struct SqlxOrderRepository {
    pool: DynDatabasePool,
}

impl SqlxOrderRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrderRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str =
    "id, session_id, reference, amount, method, status, created_at, settled_at";

/// Build the WHERE clause for a filter; binds are applied in field order
fn filter_clause(filter: &OrderFilter) -> String {
    let mut clauses = Vec::new();
    if filter.session_id.is_some() {
        clauses.push("session_id = ?");
    }
    if filter.status.is_some() {
        clauses.push("status = ?");
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn create(&self, order: &Order) -> Result<Order> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.pool.as_sqlite().unwrap(), order).await,
            DatabaseDriver::Mysql => create_mysql(self.pool.as_mysql().unwrap(), order).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get order")?;
                row.as_ref().map(row_to_order_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get order")?;
                row.as_ref().map(row_to_order_mysql).transpose()
            }
        }
    }

    async fn settle(
        &self,
        id: i64,
        method: PaymentMethod,
        settled_at: DateTime<Utc>,
    ) -> Result<Order> {
        let sql = "UPDATE orders SET status = 'settled', method = ?, settled_at = ? \
                   WHERE id = ? AND status = 'open'";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(method.to_string())
                .bind(settled_at)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to settle order")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(method.to_string())
                .bind(settled_at)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to settle order")?
                .rows_affected(),
        };

        if affected != 1 {
            anyhow::bail!("Order {} is not open", id);
        }

        self.get_by_id(id)
            .await?
            .context("Order missing after settle")
    }

    async fn unsettled_for_session(&self, session_id: i64) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE session_id = ? AND status = 'open' ORDER BY created_at",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(session_id)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list unsettled orders")?;
                rows.iter().map(row_to_order_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(session_id)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list unsettled orders")?;
                rows.iter().map(row_to_order_mysql).collect()
            }
        }
    }

    async fn settlement_totals(&self, session_id: i64) -> Result<SettlementTotals> {
        let rows: Vec<(String, i64, i64)> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let sql = "SELECT method, COALESCE(SUM(amount), 0) AS total, COUNT(*) AS cnt \
                           FROM orders WHERE session_id = ? AND status = 'settled' GROUP BY method";
                let rows = sqlx::query(sql)
                    .bind(session_id)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to aggregate settlement totals")?;
                rows.iter()
                    .map(|row| (row.get("method"), row.get("total"), row.get("cnt")))
                    .collect()
            }
            DatabaseDriver::Mysql => {
                // MySQL SUM() yields DECIMAL; cast back to a signed integer
                let sql = "SELECT method, CAST(COALESCE(SUM(amount), 0) AS SIGNED) AS total, \
                           COUNT(*) AS cnt \
                           FROM orders WHERE session_id = ? AND status = 'settled' GROUP BY method";
                let rows = sqlx::query(sql)
                    .bind(session_id)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to aggregate settlement totals")?;
                rows.iter()
                    .map(|row| (row.get("method"), row.get("total"), row.get("cnt")))
                    .collect()
            }
        };

        let mut totals = SettlementTotals::default();
        for (method, total, count) in rows {
            match PaymentMethod::from_str(&method)? {
                PaymentMethod::Cash => {
                    totals.cash_total = total;
                    totals.cash_count = count;
                }
                PaymentMethod::Card => {
                    totals.card_total = total;
                    totals.card_count = count;
                }
                PaymentMethod::Mobile => {
                    totals.mobile_total = total;
                    totals.mobile_count = count;
                }
            }
        }
        Ok(totals)
    }

    async fn list(&self, filter: OrderFilter, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS,
            filter_clause(&filter)
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                if let Some(id) = filter.session_id {
                    query = query.bind(id);
                }
                if let Some(status) = filter.status {
                    query = query.bind(status.to_string());
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list orders")?;
                rows.iter().map(row_to_order_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                if let Some(id) = filter.session_id {
                    query = query.bind(id);
                }
                if let Some(status) = filter.status {
                    query = query.bind(status.to_string());
                }
                let rows = query
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list orders")?;
                rows.iter().map(row_to_order_mysql).collect()
            }
        }
    }

    async fn count(&self, filter: OrderFilter) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM orders{}", filter_clause(&filter));
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query_scalar(&sql);
                if let Some(id) = filter.session_id {
                    query = query.bind(id);
                }
                if let Some(status) = filter.status {
                    query = query.bind(status.to_string());
                }
                let count: i64 = query
                    .fetch_one(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to count orders")?;
                Ok(count)
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query_scalar(&sql);
                if let Some(id) = filter.session_id {
                    query = query.bind(id);
                }
                if let Some(status) = filter.status {
                    query = query.bind(status.to_string());
                }
                let count: i64 = query
                    .fetch_one(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to count orders")?;
                Ok(count)
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_sqlite(pool: &SqlitePool, order: &Order) -> Result<Order> {
    let result = sqlx::query(
        r#"
        INSERT INTO orders (session_id, reference, amount, method, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(order.session_id)
    .bind(&order.reference)
    .bind(order.amount)
    .bind(order.method.map(|m| m.to_string()))
    .bind(order.status.to_string())
    .bind(order.created_at)
    .execute(pool)
    .await
    .context("Failed to create order")?;

    let mut created = order.clone();
    created.id = result.last_insert_rowid();
    Ok(created)
}

fn row_to_order_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Order> {
    let method: Option<String> = row.get("method");
    let status: String = row.get("status");
    Ok(Order {
        id: row.get("id"),
        session_id: row.get("session_id"),
        reference: row.get("reference"),
        amount: row.get("amount"),
        method: method.as_deref().map(PaymentMethod::from_str).transpose()?,
        status: OrderStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        settled_at: row.get("settled_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_mysql(pool: &MySqlPool, order: &Order) -> Result<Order> {
    let result = sqlx::query(
        r#"
        INSERT INTO orders (session_id, reference, amount, method, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(order.session_id)
    .bind(&order.reference)
    .bind(order.amount)
    .bind(order.method.map(|m| m.to_string()))
    .bind(order.status.to_string())
    .bind(order.created_at)
    .execute(pool)
    .await
    .context("Failed to create order")?;

    let mut created = order.clone();
    created.id = result.last_insert_id() as i64;
    Ok(created)
}

fn row_to_order_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Order> {
    let method: Option<String> = row.get("method");
    let status: String = row.get("status");
    Ok(Order {
        id: row.get("id"),
        session_id: row.get("session_id"),
        reference: row.get("reference"),
        amount: row.get("amount"),
        method: method.as_deref().map(PaymentMethod::from_str).transpose()?,
        status: OrderStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        settled_at: row.get("settled_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{TillSessionRepository, UserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{SessionStatus, ShiftKind, TillSession, User, UserRole};
    use chrono::NaiveDate;

    async fn setup() -> (DynDatabasePool, SqlxOrderRepository, i64) {
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

        let sessions = super::super::till_session::SqlxTillSessionRepository::new(pool.clone());
        let session = sessions
            .create(&TillSession {
                id: 0,
                cashier_id: cashier.id,
                shift: ShiftKind::Morning,
                business_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                opening_float: 100_000,
                status: SessionStatus::Open,
                actual_cash: None,
                notes: None,
                totals: None,
                opened_at: Utc::now(),
                closed_at: None,
            })
            .await
            .expect("Failed to create session");

        (pool.clone(), SqlxOrderRepository::new(pool), session.id)
    }

    fn open_order(session_id: i64, reference: &str, amount: i64) -> Order {
        Order {
            id: 0,
            session_id,
            reference: reference.to_string(),
            amount,
            method: None,
            status: OrderStatus::Open,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_order() {
        let (_pool, repo, session_id) = setup().await;

        let created = repo
            .create(&open_order(session_id, "T-0001", 12_500))
            .await
            .expect("Failed to create order");
        assert!(created.id > 0);

        let found = repo
            .get_by_id(created.id)
            .await
            .unwrap()
            .expect("Order not found");
        assert_eq!(found.reference, "T-0001");
        assert_eq!(found.amount, 12_500);
        assert_eq!(found.status, OrderStatus::Open);
        assert!(found.method.is_none());
    }

    #[tokio::test]
    async fn test_settle_order() {
        let (_pool, repo, session_id) = setup().await;
        let order = repo
            .create(&open_order(session_id, "T-0001", 12_500))
            .await
            .unwrap();

        let settled = repo
            .settle(order.id, PaymentMethod::Card, Utc::now())
            .await
            .expect("Failed to settle");
        assert_eq!(settled.status, OrderStatus::Settled);
        assert_eq!(settled.method, Some(PaymentMethod::Card));
        assert!(settled.settled_at.is_some());

        // Settling twice fails
        assert!(repo
            .settle(order.id, PaymentMethod::Cash, Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unsettled_for_session() {
        let (_pool, repo, session_id) = setup().await;
        let o1 = repo.create(&open_order(session_id, "T-0001", 1000)).await.unwrap();
        let o2 = repo.create(&open_order(session_id, "T-0002", 2000)).await.unwrap();

        repo.settle(o1.id, PaymentMethod::Cash, Utc::now())
            .await
            .unwrap();

        let unsettled = repo
            .unsettled_for_session(session_id)
            .await
            .expect("Failed to list");
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].id, o2.id);
    }

    #[tokio::test]
    async fn test_settlement_totals_grouped_by_method() {
        let (_pool, repo, session_id) = setup().await;
        for (reference, amount, method) in [
            ("T-0001", 25_000, PaymentMethod::Cash),
            ("T-0002", 25_000, PaymentMethod::Cash),
            ("T-0003", 80_000, PaymentMethod::Card),
            ("T-0004", 12_000, PaymentMethod::Mobile),
        ] {
            let order = repo.create(&open_order(session_id, reference, amount)).await.unwrap();
            repo.settle(order.id, method, Utc::now()).await.unwrap();
        }
        // One left unsettled, excluded from totals
        repo.create(&open_order(session_id, "T-0005", 99_999))
            .await
            .unwrap();

        let totals = repo
            .settlement_totals(session_id)
            .await
            .expect("Failed to aggregate");
        assert_eq!(totals.cash_total, 50_000);
        assert_eq!(totals.cash_count, 2);
        assert_eq!(totals.card_total, 80_000);
        assert_eq!(totals.card_count, 1);
        assert_eq!(totals.mobile_total, 12_000);
        assert_eq!(totals.mobile_count, 1);
        assert_eq!(totals.revenue(), 142_000);
    }

    #[tokio::test]
    async fn test_settlement_totals_empty_session() {
        let (_pool, repo, session_id) = setup().await;
        let totals = repo.settlement_totals(session_id).await.unwrap();
        assert_eq!(totals, SettlementTotals::default());
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let (_pool, repo, session_id) = setup().await;
        let o1 = repo.create(&open_order(session_id, "T-0001", 1000)).await.unwrap();
        repo.create(&open_order(session_id, "T-0002", 2000)).await.unwrap();
        repo.settle(o1.id, PaymentMethod::Cash, Utc::now())
            .await
            .unwrap();

        let all = repo
            .list(OrderFilter::default(), 50, 0)
            .await
            .expect("Failed to list");
        assert_eq!(all.len(), 2);

        let open_only = OrderFilter {
            status: Some(OrderStatus::Open),
            ..OrderFilter::default()
        };
        let open = repo.list(open_only, 50, 0).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(repo.count(open_only).await.unwrap(), 1);

        let by_session = OrderFilter {
            session_id: Some(session_id),
            ..OrderFilter::default()
        };
        assert_eq!(repo.count(by_session).await.unwrap(), 2);
    }
}
