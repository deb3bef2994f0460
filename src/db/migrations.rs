//! Database migrations module
//!
//! Code-based migrations for the Tilldesk service. All migrations are
//! embedded directly in Rust code as SQL strings, supporting both SQLite and
//! MySQL for single-binary deployment.
//!
//! # Architecture
//!
//! Each migration is a `Migration` struct with a unique `version`, a name,
//! and per-driver SQL. Applied versions are tracked in a `_migrations` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations for the Tilldesk service.
pub const MIGRATIONS: &[Migration] = &[
    // Migration 1: staff accounts
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'cashier',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'cashier',
                active TINYINT NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_username ON users(username);
        "#,
    },
    // Migration 2: login sessions (cookie auth + CSRF token)
    Migration {
        version: 2,
        name: "create_auth_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                csrf_token VARCHAR(64) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_user_id ON auth_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_expires_at ON auth_sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                csrf_token VARCHAR(64) NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_auth_sessions_user_id ON auth_sessions(user_id);
            CREATE INDEX idx_auth_sessions_expires_at ON auth_sessions(expires_at);
        "#,
    },
    // Migration 3: shift schedule
    Migration {
        version: 3,
        name: "create_shift_assignments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS shift_assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cashier_id INTEGER NOT NULL,
                date DATE NOT NULL,
                shift VARCHAR(20) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (cashier_id) REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE (cashier_id, date, shift)
            );
            CREATE INDEX IF NOT EXISTS idx_shift_assignments_date ON shift_assignments(date);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS shift_assignments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                cashier_id BIGINT NOT NULL,
                date DATE NOT NULL,
                shift VARCHAR(20) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (cashier_id) REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE KEY uq_shift_assignment (cashier_id, date, shift)
            );
            CREATE INDEX idx_shift_assignments_date ON shift_assignments(date);
        "#,
    },
    // Migration 4: till sessions
    Migration {
        version: 4,
        name: "create_till_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS till_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cashier_id INTEGER NOT NULL,
                shift VARCHAR(20) NOT NULL,
                business_date DATE NOT NULL,
                opening_float BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                actual_cash BIGINT,
                notes TEXT,
                cash_total BIGINT,
                cash_count BIGINT,
                card_total BIGINT,
                card_count BIGINT,
                mobile_total BIGINT,
                mobile_count BIGINT,
                opened_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                closed_at TIMESTAMP,
                FOREIGN KEY (cashier_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_till_sessions_cashier
                ON till_sessions(cashier_id, business_date, shift, status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS till_sessions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                cashier_id BIGINT NOT NULL,
                shift VARCHAR(20) NOT NULL,
                business_date DATE NOT NULL,
                opening_float BIGINT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                actual_cash BIGINT,
                notes TEXT,
                cash_total BIGINT,
                cash_count BIGINT,
                card_total BIGINT,
                card_count BIGINT,
                mobile_total BIGINT,
                mobile_count BIGINT,
                opened_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                closed_at TIMESTAMP NULL,
                FOREIGN KEY (cashier_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_till_sessions_cashier
                ON till_sessions(cashier_id, business_date, shift, status);
        "#,
    },
    // Migration 5: orders
    Migration {
        version: 5,
        name: "create_orders",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                reference VARCHAR(32) NOT NULL,
                amount BIGINT NOT NULL,
                method VARCHAR(20),
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                settled_at TIMESTAMP,
                FOREIGN KEY (session_id) REFERENCES till_sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_orders_session ON orders(session_id, status);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS orders (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                session_id BIGINT NOT NULL,
                reference VARCHAR(32) NOT NULL,
                amount BIGINT NOT NULL,
                method VARCHAR(20),
                status VARCHAR(20) NOT NULL DEFAULT 'open',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                settled_at TIMESTAMP NULL,
                FOREIGN KEY (session_id) REFERENCES till_sessions(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_orders_session ON orders(session_id, status);
        "#,
    },
    // Migration 6: frozen settlement reports
    Migration {
        version: 6,
        name: "create_session_reports",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS session_reports (
                session_id INTEGER PRIMARY KEY,
                report TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (session_id) REFERENCES till_sessions(id) ON DELETE CASCADE
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS session_reports (
                session_id BIGINT PRIMARY KEY,
                report TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (session_id) REFERENCES till_sessions(id) ON DELETE CASCADE
            );
        "#,
    },
];

/// Run all pending migrations
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// Get list of already applied migrations
async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.as_sqlite().unwrap()).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.as_mysql().unwrap()).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }
    Ok(records)
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::new();
    for row in rows {
        let version: i32 = row.get("version");
        records.push(MigrationRecord {
            version: version as i64,
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }
    Ok(records)
}

/// Apply a single migration and record it
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    // Statements are separated by semicolons; run them one at a time so the
    // same migration text works on both drivers.
    for statement in sql.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        pool.execute(statement)
            .await
            .with_context(|| format!("Migration {} failed", migration.name))?;
    }

    let record_sql = format!(
        "INSERT INTO _migrations (version, name) VALUES ({}, '{}')",
        migration.version, migration.name
    );
    pool.execute(&record_sql).await?;

    Ok(())
}
