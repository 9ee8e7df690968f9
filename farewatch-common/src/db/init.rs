//! Database initialization
//!
//! Creates the database file on first run and brings the schema up
//! idempotently. All timestamps are RFC 3339 TEXT; flights additionally
//! keep a Unix-seconds departure column so range scans and pruning do
//! not depend on string comparison across mixed UTC offsets.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows the scheduler to write while API reads are in flight
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent — safe to call multiple times).
///
/// Split out from [`init_database`] so tests can apply the schema to an
/// in-memory pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_flights_table(pool).await?;
    create_search_profiles_table(pool).await?;
    create_deals_table(pool).await?;
    create_scan_log_table(pool).await?;
    create_profile_runs_table(pool).await?;
    Ok(())
}

/// Shared one-way fare pool. One row per flight identity; re-observation
/// upserts on `key`.
async fn create_flights_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flights (
            key TEXT PRIMARY KEY,
            origin TEXT NOT NULL,
            origin_name TEXT NOT NULL DEFAULT '',
            destination TEXT NOT NULL,
            destination_name TEXT NOT NULL DEFAULT '',
            departure TEXT NOT NULL,
            departure_utc INTEGER NOT NULL,
            arrival TEXT NOT NULL,
            flight_number TEXT NOT NULL,
            price REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'EUR',
            observed_at TEXT NOT NULL,
            CHECK (price >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flights_origin ON flights(origin)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flights_destination ON flights(destination)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_flights_departure_utc ON flights(departure_utc)")
        .execute(pool)
        .await?;

    Ok(())
}

/// User search profiles. Written by the dashboard; the pipeline only
/// reads them. List-valued columns and the strategy are JSON TEXT.
async fn create_search_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_profiles (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            origins TEXT NOT NULL,
            allowed_countries TEXT,
            notify_destinations TEXT,
            price_ceiling REAL,
            strategy TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Detected deals. The UNIQUE constraint is the deal identity: one row
/// per (profile, destination, outbound date, return date), cheapest
/// pairing wins. Flight keys are deliberately not foreign keys — deals
/// outlive pruned flights as a historical record.
async fn create_deals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deals (
            guid TEXT PRIMARY KEY,
            profile_guid TEXT NOT NULL REFERENCES search_profiles(guid) ON DELETE CASCADE,
            destination TEXT NOT NULL,
            destination_name TEXT NOT NULL DEFAULT '',
            origin TEXT NOT NULL,
            return_origin TEXT NOT NULL,
            outbound_key TEXT NOT NULL,
            return_key TEXT NOT NULL,
            outbound_departure TEXT NOT NULL,
            return_departure TEXT NOT NULL,
            out_date TEXT NOT NULL,
            in_date TEXT NOT NULL,
            nights INTEGER NOT NULL,
            total_price REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'EUR',
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            notified INTEGER NOT NULL DEFAULT 0,
            notified_price REAL,
            CHECK (total_price >= 0),
            CHECK (nights >= 0),
            UNIQUE (profile_guid, destination, out_date, in_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deals_profile ON deals(profile_guid)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deals_profile_price ON deals(profile_guid, total_price)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Scan attempts per origin. The latest `next_due_at` per origin drives
/// the cooldown check; older rows are retained briefly for inspection
/// and aged out by the prune pass.
async fn create_scan_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            origin TEXT NOT NULL,
            scanned_at TEXT NOT NULL,
            next_due_at TEXT NOT NULL,
            outcome TEXT NOT NULL DEFAULT 'ok'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_log_origin ON scan_log(origin, next_due_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Per-profile run summaries. The engine derives "due for refresh" from
/// the latest row per profile; the status API reads the same rows.
/// Profiles stay read-only to the pipeline.
async fn create_profile_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profile_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_guid TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            success INTEGER NOT NULL,
            fares_upserted INTEGER NOT NULL DEFAULT 0,
            deals_matched INTEGER NOT NULL DEFAULT 0,
            deals_new INTEGER NOT NULL DEFAULT 0,
            notifications_sent INTEGER NOT NULL DEFAULT 0,
            detail TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_profile_runs_profile ON profile_runs(profile_guid, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
