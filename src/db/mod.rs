mod models;
pub mod store;

pub use models::*;
pub use store::{
    Entity, EntityStore, FieldValue, Fields, Filter, ListQuery, NewRecord, Page, Pagination,
    PatchRecord, SortOrder,
};

use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::Config;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(config: &Config) -> Result<DbPool> {
    let db_path = config.server.data_dir.join(&config.database.file_name);
    let timeout = Duration::from_secs(config.database.timeout_secs);

    info!("Initializing database at {}", db_path.display());

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Single-connection in-memory database with the full schema.
///
/// Every pooled connection to `:memory:` would see its own empty database, so
/// the pool is pinned to one connection that is never recycled.
pub async fn init_in_memory() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: staff and client accounts
    execute_sql(pool, include_str!("../../migrations/001_accounts.sql")).await?;

    // Migration 002: projects, milestones, project files
    execute_sql(pool, include_str!("../../migrations/002_projects.sql")).await?;

    // Migration 003: service bookings with the live-slot unique index
    let has_bookings_table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='service_bookings'",
    )
    .fetch_optional(pool)
    .await?;
    if has_bookings_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/003_service_bookings.sql")).await?;
    }

    // Migration 004: public content
    let has_blogs_table: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name='blogs'")
            .fetch_optional(pool)
            .await?;
    if has_blogs_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/004_content.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}
