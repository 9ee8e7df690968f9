//! Per-profile run summaries.
//!
//! One row per completed `run_profile` pass, successful or not. The
//! scheduler derives "due for refresh" from the latest row per profile
//! and the status API surfaces the same rows. Pruning keeps the latest
//! row for every profile so an idle profile never loses its history.

use chrono::{DateTime, Utc};
use farewatch_common::{time, Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Outcome of one pipeline pass over a profile.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileRun {
    pub profile_guid: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub fares_upserted: i64,
    pub deals_matched: i64,
    pub deals_new: i64,
    pub notifications_sent: i64,
    /// Free-form diagnostics, e.g. per-origin outcomes or the failure
    /// message.
    pub detail: serde_json::Value,
}

pub async fn record_run(pool: &SqlitePool, run: &ProfileRun) -> Result<()> {
    let detail = serde_json::to_string(&run.detail)
        .map_err(|e| Error::Internal(format!("serializing run detail: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO profile_runs (profile_guid, started_at, finished_at, success,
            fares_upserted, deals_matched, deals_new, notifications_sent, detail)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&run.profile_guid)
    .bind(time::utc_to_db(run.started_at))
    .bind(time::utc_to_db(run.finished_at))
    .bind(run.success as i64)
    .bind(run.fares_upserted)
    .bind(run.deals_matched)
    .bind(run.deals_new)
    .bind(run.notifications_sent)
    .bind(detail)
    .execute(pool)
    .await?;
    Ok(())
}

/// Latest run per profile, ordered by profile guid.
pub async fn latest_runs(pool: &SqlitePool) -> Result<Vec<ProfileRun>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM profile_runs
        WHERE id IN (SELECT MAX(id) FROM profile_runs GROUP BY profile_guid)
        ORDER BY profile_guid ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(run_from_row).collect()
}

/// Drop runs older than `cutoff`, always keeping the latest row per
/// profile. Returns the number of rows removed.
pub async fn prune_runs(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM profile_runs
        WHERE started_at < ?
          AND id NOT IN (SELECT MAX(id) FROM profile_runs GROUP BY profile_guid)
        "#,
    )
    .bind(time::utc_to_db(cutoff))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn run_from_row(row: &SqliteRow) -> Result<ProfileRun> {
    let started_at: String = row.get("started_at");
    let finished_at: String = row.get("finished_at");
    let success: i64 = row.get("success");
    let detail: String = row.get("detail");
    Ok(ProfileRun {
        profile_guid: row.get("profile_guid"),
        started_at: time::parse_utc(&started_at)?,
        finished_at: time::parse_utc(&finished_at)?,
        success: success != 0,
        fares_upserted: row.get("fares_upserted"),
        deals_matched: row.get("deals_matched"),
        deals_new: row.get("deals_new"),
        notifications_sent: row.get("notifications_sent"),
        detail: serde_json::from_str(&detail)
            .map_err(|e| Error::Internal(format!("parsing run detail: {e}")))?,
    })
}
