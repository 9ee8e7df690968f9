//! Search profile loading
//!
//! The pipeline treats profiles as read-only input owned by the
//! dashboard. Strategies are validated here, at the row boundary: a
//! profile with a malformed strategy is skipped with a warning and
//! never reaches the matcher.

use farewatch_common::model::{SearchProfile, Strategy};
use farewatch_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::warn;

/// Load all active profiles, skipping rows that fail validation.
pub async fn list_active_profiles(pool: &SqlitePool) -> Result<Vec<SearchProfile>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, name, origins, allowed_countries, notify_destinations,
               price_ceiling, strategy, active
        FROM search_profiles
        WHERE active = 1
        ORDER BY guid
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut profiles = Vec::new();
    for row in &rows {
        match profile_from_row(row) {
            Ok(profile) => profiles.push(profile),
            Err(e) => {
                let guid: String = row.get("guid");
                warn!("Skipping unreadable profile {}: {}", guid, e);
            }
        }
    }
    Ok(profiles)
}

/// Load one profile by guid. Unlike the bulk loader this propagates
/// validation errors, so a manual refresh of a broken profile reports
/// the cause instead of silently doing nothing.
pub async fn get_profile(pool: &SqlitePool, guid: &str) -> Result<Option<SearchProfile>> {
    let row = sqlx::query(
        r#"
        SELECT guid, name, origins, allowed_countries, notify_destinations,
               price_ceiling, strategy, active
        FROM search_profiles
        WHERE guid = ?
        "#,
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(profile_from_row(&row)?)),
        None => Ok(None),
    }
}

/// Insert or replace a profile row. This is the write surface used by
/// the dashboard tooling and by tests; the pipeline never calls it.
pub async fn save_profile(pool: &SqlitePool, profile: &SearchProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO search_profiles (guid, name, origins, allowed_countries,
            notify_destinations, price_ceiling, strategy, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(guid) DO UPDATE SET
            name = excluded.name,
            origins = excluded.origins,
            allowed_countries = excluded.allowed_countries,
            notify_destinations = excluded.notify_destinations,
            price_ceiling = excluded.price_ceiling,
            strategy = excluded.strategy,
            active = excluded.active,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&profile.guid)
    .bind(&profile.name)
    .bind(to_json_list(&profile.origins)?)
    .bind(optional_json_list(&profile.allowed_countries)?)
    .bind(optional_json_list(&profile.notify_destinations)?)
    .bind(profile.price_ceiling)
    .bind(profile.strategy.to_json()?)
    .bind(profile.active as i64)
    .execute(pool)
    .await?;

    Ok(())
}

fn profile_from_row(row: &SqliteRow) -> Result<SearchProfile> {
    let origins: String = row.get("origins");
    let allowed_countries: Option<String> = row.get("allowed_countries");
    let notify_destinations: Option<String> = row.get("notify_destinations");
    let strategy: String = row.get("strategy");
    let active: i64 = row.get("active");

    Ok(SearchProfile {
        guid: row.get("guid"),
        name: row.get("name"),
        origins: from_json_list(&origins)?,
        allowed_countries: allowed_countries
            .as_deref()
            .map(from_json_list)
            .transpose()?
            .unwrap_or_default(),
        notify_destinations: notify_destinations
            .as_deref()
            .map(from_json_list)
            .transpose()?
            .unwrap_or_default(),
        price_ceiling: row.get("price_ceiling"),
        strategy: Strategy::from_json(&strategy)?,
        active: active != 0,
    })
}

fn from_json_list(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidInput(format!("malformed list column: {}", e)))
}

fn to_json_list(values: &[String]) -> Result<String> {
    serde_json::to_string(values)
        .map_err(|e| Error::Internal(format!("list serialization failed: {}", e)))
}

/// Empty lists are stored as NULL, matching rows written by older
/// dashboard builds.
fn optional_json_list(values: &[String]) -> Result<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        to_json_list(values).map(Some)
    }
}
