//! Scan history per origin airport.
//!
//! Every fetch attempt against the fare source appends a row recording
//! when the origin was scanned and when it next becomes due. The
//! cooldown gate reads the latest `next_due_at` per origin; a
//! rate-limited attempt records a longer backoff instead of an
//! ordinary cooldown.

use chrono::{DateTime, Utc};
use farewatch_common::{time, Result};
use sqlx::SqlitePool;

/// How a scan attempt ended, as stored in the `outcome` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Ok,
    RateLimited,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Ok => "ok",
            ScanOutcome::RateLimited => "rate_limited",
        }
    }
}

/// Earliest instant the origin may be scanned again, if it has any
/// history. UTC timestamps sort lexicographically, so MAX works on the
/// stored text.
pub async fn next_due(pool: &SqlitePool, origin: &str) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> =
        sqlx::query_scalar("SELECT MAX(next_due_at) FROM scan_log WHERE origin = ?")
            .bind(origin)
            .fetch_one(pool)
            .await?;

    match latest {
        Some(raw) => Ok(Some(time::parse_utc(&raw)?)),
        None => Ok(None),
    }
}

pub async fn record_scan(
    pool: &SqlitePool,
    origin: &str,
    scanned_at: DateTime<Utc>,
    next_due_at: DateTime<Utc>,
    outcome: ScanOutcome,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO scan_log (origin, scanned_at, next_due_at, outcome) VALUES (?, ?, ?, ?)",
    )
    .bind(origin)
    .bind(time::utc_to_db(scanned_at))
    .bind(time::utc_to_db(next_due_at))
    .bind(outcome.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Drop history older than `cutoff`. Returns the number of rows removed.
pub async fn prune_scan_log(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM scan_log WHERE scanned_at < ?")
        .bind(time::utc_to_db(cutoff))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use farewatch_common::db::create_schema;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_next_due_empty_history() {
        let pool = memory_pool().await;
        assert_eq!(next_due(&pool, "PSA").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_due_takes_latest_row() {
        let pool = memory_pool().await;
        let t0 = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 7, 1, 11, 0, 0).unwrap();

        record_scan(&pool, "PSA", t0, t0 + chrono::Duration::minutes(30), ScanOutcome::Ok)
            .await
            .unwrap();
        record_scan(
            &pool,
            "PSA",
            t1,
            t1 + chrono::Duration::minutes(60),
            ScanOutcome::RateLimited,
        )
        .await
        .unwrap();
        // Other origins never interfere
        record_scan(&pool, "BLQ", t1, t1 + chrono::Duration::hours(5), ScanOutcome::Ok)
            .await
            .unwrap();

        let due = next_due(&pool, "PSA").await.unwrap().unwrap();
        assert_eq!(due, t1 + chrono::Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_rows() {
        let pool = memory_pool().await;
        let old = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();

        record_scan(&pool, "PSA", old, old, ScanOutcome::Ok).await.unwrap();
        record_scan(&pool, "PSA", recent, recent, ScanOutcome::Ok)
            .await
            .unwrap();

        let cutoff = Utc.with_ymd_and_hms(2025, 6, 24, 0, 0, 0).unwrap();
        let removed = prune_scan_log(&pool, cutoff).await.unwrap();
        assert_eq!(removed, 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
