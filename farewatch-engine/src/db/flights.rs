//! Flight pool persistence
//!
//! One row per flight identity; scans upsert, matching reads a
//! single-statement snapshot, and pruning removes departed or stale
//! observations between pipeline stages.

use chrono::{DateTime, Utc};
use farewatch_common::model::Flight;
use farewatch_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Insert or refresh a batch of fare observations. Returns the number
/// of rows written. Re-observing an identity never duplicates it.
pub async fn upsert_flights(pool: &SqlitePool, flights: &[Flight]) -> Result<u64> {
    let mut written = 0;
    for flight in flights {
        sqlx::query(
            r#"
            INSERT INTO flights (key, origin, origin_name, destination, destination_name,
                departure, departure_utc, arrival, flight_number, price, currency, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                origin_name = excluded.origin_name,
                destination_name = excluded.destination_name,
                arrival = excluded.arrival,
                price = excluded.price,
                currency = excluded.currency,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(flight.key())
        .bind(&flight.origin)
        .bind(&flight.origin_name)
        .bind(&flight.destination)
        .bind(&flight.destination_name)
        .bind(time::local_to_db(flight.departure))
        .bind(flight.departure.timestamp())
        .bind(time::local_to_db(flight.arrival))
        .bind(&flight.flight_number)
        .bind(flight.price)
        .bind(&flight.currency)
        .bind(time::utc_to_db(flight.observed_at))
        .execute(pool)
        .await?;
        written += 1;
    }
    Ok(written)
}

/// Snapshot of live flights touching any of the given airports, as
/// outbound legs (origin in the set) or return legs (destination in the
/// set). Live means departure in the future and observation within the
/// staleness horizon. One statement, so a concurrent prune can never
/// shrink the snapshot mid-read.
pub async fn live_flights_for_origins(
    pool: &SqlitePool,
    origins: &[String],
    now: DateTime<Utc>,
    staleness: chrono::Duration,
) -> Result<Vec<Flight>> {
    if origins.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; origins.len()].join(", ");
    let sql = format!(
        r#"
        SELECT origin, origin_name, destination, destination_name,
               departure, arrival, flight_number, price, currency, observed_at
        FROM flights
        WHERE (origin IN ({placeholders}) OR destination IN ({placeholders}))
          AND departure_utc > ?
          AND observed_at >= ?
        ORDER BY key
        "#
    );

    let mut query = sqlx::query(&sql);
    for origin in origins {
        query = query.bind(origin);
    }
    for origin in origins {
        query = query.bind(origin);
    }
    query = query
        .bind(now.timestamp())
        .bind(time::utc_to_db(now - staleness));

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(flight_from_row).collect()
}

/// Remove departed flights and observations older than the staleness
/// horizon. Returns the number of rows deleted.
pub async fn prune_flights(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    staleness: chrono::Duration,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM flights WHERE departure_utc <= ? OR observed_at < ?")
        .bind(now.timestamp())
        .bind(time::utc_to_db(now - staleness))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_flights(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flights")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn flight_from_row(row: &SqliteRow) -> Result<Flight> {
    let departure: String = row.get("departure");
    let arrival: String = row.get("arrival");
    let observed_at: String = row.get("observed_at");
    Ok(Flight {
        origin: row.get("origin"),
        origin_name: row.get("origin_name"),
        destination: row.get("destination"),
        destination_name: row.get("destination_name"),
        departure: time::parse_local(&departure)?,
        arrival: time::parse_local(&arrival)?,
        flight_number: row.get("flight_number"),
        price: row.get("price"),
        currency: row.get("currency"),
        observed_at: time::parse_utc(&observed_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use farewatch_common::db::create_schema;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    fn flight(origin: &str, destination: &str, day: u32, hour: u32, price: f64) -> Flight {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let departure = tz.with_ymd_and_hms(2025, 7, day, hour, 0, 0).unwrap();
        Flight {
            origin: origin.to_string(),
            origin_name: format!("{origin} Airport"),
            destination: destination.to_string(),
            destination_name: format!("{destination} Airport"),
            departure,
            arrival: departure + chrono::Duration::hours(2),
            flight_number: "FR100".to_string(),
            price,
            currency: "EUR".to_string(),
            observed_at: Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_refreshes_instead_of_duplicating() {
        let pool = memory_pool().await;

        let first = flight("PSA", "BCN", 4, 18, 30.0);
        upsert_flights(&pool, &[first.clone()]).await.unwrap();

        let mut cheaper = first.clone();
        cheaper.price = 19.99;
        cheaper.observed_at = first.observed_at + chrono::Duration::hours(1);
        upsert_flights(&pool, &[cheaper]).await.unwrap();

        assert_eq!(count_flights(&pool).await.unwrap(), 1);
        let price: f64 = sqlx::query_scalar("SELECT price FROM flights")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(price, 19.99);
    }

    #[tokio::test]
    async fn test_snapshot_filters_departed_and_stale() {
        let pool = memory_pool().await;
        let now = Utc.with_ymd_and_hms(2025, 7, 3, 12, 0, 0).unwrap();
        let staleness = chrono::Duration::hours(24);

        // Live outbound and return legs
        let mut live_out = flight("PSA", "BCN", 4, 18, 30.0);
        live_out.observed_at = now;
        let mut live_ret = flight("BCN", "PSA", 6, 16, 30.0);
        live_ret.observed_at = now;
        // Departure already in the past relative to `now`
        let mut departed = flight("PSA", "BCN", 2, 18, 30.0);
        departed.observed_at = now;
        // Fresh departure but stale observation
        let mut stale = flight("PSA", "MAD", 5, 10, 30.0);
        stale.observed_at = now - chrono::Duration::hours(25);
        // Unrelated route
        let mut other = flight("BLQ", "DUB", 4, 18, 30.0);
        other.observed_at = now;

        upsert_flights(&pool, &[live_out, live_ret, departed, stale, other])
            .await
            .unwrap();

        let snapshot =
            live_flights_for_origins(&pool, &["PSA".to_string()], now, staleness)
                .await
                .unwrap();
        let mut routes: Vec<String> = snapshot
            .iter()
            .map(|f| format!("{}-{}", f.origin, f.destination))
            .collect();
        routes.sort();
        assert_eq!(routes, vec!["BCN-PSA".to_string(), "PSA-BCN".to_string()]);
    }

    #[tokio::test]
    async fn test_prune_removes_departed_and_stale() {
        let pool = memory_pool().await;
        let now = Utc.with_ymd_and_hms(2025, 7, 3, 12, 0, 0).unwrap();

        let mut live = flight("PSA", "BCN", 4, 18, 30.0);
        live.observed_at = now;
        let mut departed = flight("PSA", "BCN", 2, 18, 30.0);
        departed.observed_at = now;
        let mut stale = flight("PSA", "MAD", 5, 10, 30.0);
        stale.observed_at = now - chrono::Duration::hours(25);

        upsert_flights(&pool, &[live, departed, stale]).await.unwrap();

        let pruned = prune_flights(&pool, now, chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(pruned, 2);
        assert_eq!(count_flights(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_origin_set_returns_nothing() {
        let pool = memory_pool().await;
        let now = Utc.with_ymd_and_hms(2025, 7, 3, 12, 0, 0).unwrap();
        let snapshot = live_flights_for_origins(&pool, &[], now, chrono::Duration::hours(24))
            .await
            .unwrap();
        assert!(snapshot.is_empty());
    }
}
