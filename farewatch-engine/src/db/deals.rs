//! Deal store
//!
//! Deals are keyed by (profile, destination, outbound date, return
//! date); within one key only the cheapest pairing survives. The upsert
//! is a single statement so concurrent runs of the same profile cannot
//! race each other into duplicates. Rows are history: pruning flights
//! hides deals from active views but never deletes them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use farewatch_common::model::{Deal, SearchProfile};
use farewatch_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// What a deal upsert did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpsertOutcome {
    /// First time this identity was seen
    Inserted,
    /// Identity existed and the candidate was cheaper
    Improved { previous: f64 },
    /// Identity existed at an equal or lower price; only last_seen moved
    Unchanged,
}

/// Page size for deal listings.
pub const PAGE_SIZE: i64 = 100;

/// Filters for the dashboard-facing deal listing.
#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    /// Exact destination airport
    pub destination: Option<String>,
    /// Destination must be one of these airports (country filter,
    /// resolved to IATA codes by the caller)
    pub destinations: Option<Vec<String>>,
    /// Maximum total price
    pub max_price: Option<f64>,
    /// Restrict to deals whose legs are still in the pool with a future
    /// outbound departure
    pub active_only: bool,
    /// 1-indexed page
    pub page: i64,
}

/// Insert a candidate deal or improve the stored one if the candidate
/// is cheaper. An improvement re-arms notification only when the drop
/// below the last notified price exceeds `renotify_drop`.
pub async fn upsert_if_better(
    pool: &SqlitePool,
    deal: &Deal,
    renotify_drop: f64,
) -> Result<UpsertOutcome> {
    // Classification read; the write below is atomic regardless.
    let existing: Option<f64> = sqlx::query_scalar(
        "SELECT total_price FROM deals
         WHERE profile_guid = ? AND destination = ? AND out_date = ? AND in_date = ?",
    )
    .bind(&deal.profile_guid)
    .bind(&deal.destination)
    .bind(deal.outbound_departure.date_naive().to_string())
    .bind(deal.return_departure.date_naive().to_string())
    .fetch_optional(pool)
    .await?;

    let outcome = match existing {
        None => UpsertOutcome::Inserted,
        Some(previous) if deal.total_price < previous => UpsertOutcome::Improved { previous },
        Some(_) => UpsertOutcome::Unchanged,
    };

    // Every improvable column is gated on the candidate being cheaper;
    // last_seen always advances. SQLite evaluates the unqualified
    // column references against the pre-update row, so clause order
    // does not matter.
    sqlx::query(
        r#"
        INSERT INTO deals (guid, profile_guid, destination, destination_name, origin,
            return_origin, outbound_key, return_key, outbound_departure, return_departure,
            out_date, in_date, nights, total_price, currency, first_seen, last_seen,
            notified, notified_price)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL)
        ON CONFLICT(profile_guid, destination, out_date, in_date) DO UPDATE SET
            destination_name = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.destination_name ELSE deals.destination_name END,
            origin = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.origin ELSE deals.origin END,
            return_origin = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.return_origin ELSE deals.return_origin END,
            outbound_key = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.outbound_key ELSE deals.outbound_key END,
            return_key = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.return_key ELSE deals.return_key END,
            outbound_departure = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.outbound_departure ELSE deals.outbound_departure END,
            return_departure = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.return_departure ELSE deals.return_departure END,
            nights = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.nights ELSE deals.nights END,
            currency = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.currency ELSE deals.currency END,
            notified = CASE WHEN excluded.total_price < deals.total_price
                    AND deals.notified = 1
                    AND deals.notified_price IS NOT NULL
                    AND (deals.notified_price - excluded.total_price) > ?
                THEN 0 ELSE deals.notified END,
            total_price = CASE WHEN excluded.total_price < deals.total_price
                THEN excluded.total_price ELSE deals.total_price END,
            last_seen = excluded.last_seen
        "#,
    )
    .bind(&deal.guid)
    .bind(&deal.profile_guid)
    .bind(&deal.destination)
    .bind(&deal.destination_name)
    .bind(&deal.origin)
    .bind(&deal.return_origin)
    .bind(&deal.outbound_key)
    .bind(&deal.return_key)
    .bind(time::local_to_db(deal.outbound_departure))
    .bind(time::local_to_db(deal.return_departure))
    .bind(deal.outbound_departure.date_naive().to_string())
    .bind(deal.return_departure.date_naive().to_string())
    .bind(deal.nights)
    .bind(deal.total_price)
    .bind(&deal.currency)
    .bind(time::utc_to_db(deal.first_seen))
    .bind(time::utc_to_db(deal.last_seen))
    .bind(renotify_drop)
    .execute(pool)
    .await?;

    Ok(outcome)
}

/// Deals awaiting notification for a profile, within its price ceiling,
/// cheapest first.
pub async fn unnotified_deals(
    pool: &SqlitePool,
    profile_guid: &str,
    price_ceiling: Option<f64>,
) -> Result<Vec<Deal>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM deals
        WHERE profile_guid = ? AND notified = 0
          AND (? IS NULL OR total_price <= ?)
        ORDER BY total_price ASC, guid ASC
        "#,
    )
    .bind(profile_guid)
    .bind(price_ceiling)
    .bind(price_ceiling)
    .fetch_all(pool)
    .await?;

    rows.iter().map(deal_from_row).collect()
}

/// Mark deals notified at their current price. Applied to every deal
/// considered by a dispatch pass, including suppressed ones, so they
/// are not reconsidered every cycle.
pub async fn mark_notified(pool: &SqlitePool, deal_guids: &[String]) -> Result<()> {
    if deal_guids.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; deal_guids.len()].join(", ");
    let sql = format!(
        "UPDATE deals SET notified = 1, notified_price = total_price WHERE guid IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql);
    for guid in deal_guids {
        query = query.bind(guid);
    }
    query.execute(pool).await?;
    Ok(())
}

/// All deals for a profile within its ceiling, cheapest first. Digest
/// input; includes already-notified deals.
pub async fn deals_within_ceiling(
    pool: &SqlitePool,
    profile_guid: &str,
    price_ceiling: Option<f64>,
) -> Result<Vec<Deal>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM deals
        WHERE profile_guid = ?
          AND (? IS NULL OR total_price <= ?)
        ORDER BY total_price ASC, guid ASC
        "#,
    )
    .bind(profile_guid)
    .bind(price_ceiling)
    .bind(price_ceiling)
    .fetch_all(pool)
    .await?;

    rows.iter().map(deal_from_row).collect()
}

/// Cheapest in-ceiling deal per destination across the given profiles,
/// cheapest first. Feeds the daily digest.
pub async fn best_per_destination(
    pool: &SqlitePool,
    profiles: &[SearchProfile],
) -> Result<Vec<Deal>> {
    let mut best: HashMap<String, Deal> = HashMap::new();
    for profile in profiles {
        let deals = deals_within_ceiling(pool, &profile.guid, profile.price_ceiling).await?;
        for deal in deals {
            match best.get(&deal.destination) {
                Some(current) if current.total_price <= deal.total_price => {}
                _ => {
                    best.insert(deal.destination.clone(), deal);
                }
            }
        }
    }
    let mut deals: Vec<Deal> = best.into_values().collect();
    deals.sort_by(|a, b| {
        a.total_price
            .total_cmp(&b.total_price)
            .then_with(|| a.destination.cmp(&b.destination))
    });
    Ok(deals)
}

/// Filtered, paginated deal listing for the dashboard API. Returns the
/// page of deals plus the total match count.
pub async fn list_deals(
    pool: &SqlitePool,
    profile_guid: &str,
    filter: &DealFilter,
    now: DateTime<Utc>,
) -> Result<(Vec<Deal>, i64)> {
    let mut conditions = vec!["deals.profile_guid = ?".to_string()];
    if filter.destination.is_some() {
        conditions.push("deals.destination = ?".to_string());
    }
    if let Some(destinations) = &filter.destinations {
        if destinations.is_empty() {
            return Ok((Vec::new(), 0));
        }
        let placeholders = vec!["?"; destinations.len()].join(", ");
        conditions.push(format!("deals.destination IN ({placeholders})"));
    }
    if filter.max_price.is_some() {
        conditions.push("deals.total_price <= ?".to_string());
    }

    // Active deals still have both legs in the pool and a future
    // outbound departure; the join gives the exact departure instant.
    let from = if filter.active_only {
        conditions.push("fo.departure_utc > ?".to_string());
        "deals
         JOIN flights fo ON fo.key = deals.outbound_key
         JOIN flights fr ON fr.key = deals.return_key"
    } else {
        "deals"
    };
    let where_clause = conditions.join(" AND ");

    let count_sql = format!("SELECT COUNT(*) FROM {from} WHERE {where_clause}");
    let mut count_query = sqlx::query_scalar(&count_sql).bind(profile_guid);
    if let Some(destination) = &filter.destination {
        count_query = count_query.bind(destination);
    }
    if let Some(destinations) = &filter.destinations {
        for destination in destinations {
            count_query = count_query.bind(destination);
        }
    }
    if let Some(max_price) = filter.max_price {
        count_query = count_query.bind(max_price);
    }
    if filter.active_only {
        count_query = count_query.bind(now.timestamp());
    }
    let total: i64 = count_query.fetch_one(pool).await?;

    let page = filter.page.max(1);
    let offset = (page - 1) * PAGE_SIZE;
    let list_sql = format!(
        "SELECT deals.* FROM {from} WHERE {where_clause}
         ORDER BY deals.total_price ASC, deals.guid ASC
         LIMIT {PAGE_SIZE} OFFSET {offset}"
    );
    let mut list_query = sqlx::query(&list_sql).bind(profile_guid);
    if let Some(destination) = &filter.destination {
        list_query = list_query.bind(destination);
    }
    if let Some(destinations) = &filter.destinations {
        for destination in destinations {
            list_query = list_query.bind(destination);
        }
    }
    if let Some(max_price) = filter.max_price {
        list_query = list_query.bind(max_price);
    }
    if filter.active_only {
        list_query = list_query.bind(now.timestamp());
    }
    let rows = list_query.fetch_all(pool).await?;

    let deals = rows.iter().map(deal_from_row).collect::<Result<Vec<_>>>()?;
    Ok((deals, total))
}

fn deal_from_row(row: &SqliteRow) -> Result<Deal> {
    let outbound_departure: String = row.get("outbound_departure");
    let return_departure: String = row.get("return_departure");
    let first_seen: String = row.get("first_seen");
    let last_seen: String = row.get("last_seen");
    let notified: i64 = row.get("notified");
    Ok(Deal {
        guid: row.get("guid"),
        profile_guid: row.get("profile_guid"),
        destination: row.get("destination"),
        destination_name: row.get("destination_name"),
        origin: row.get("origin"),
        return_origin: row.get("return_origin"),
        outbound_key: row.get("outbound_key"),
        return_key: row.get("return_key"),
        outbound_departure: time::parse_local(&outbound_departure)?,
        return_departure: time::parse_local(&return_departure)?,
        nights: row.get("nights"),
        total_price: row.get("total_price"),
        currency: row.get("currency"),
        first_seen: time::parse_utc(&first_seen)?,
        last_seen: time::parse_utc(&last_seen)?,
        notified: notified != 0,
        notified_price: row.get("notified_price"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{flights, profiles};
    use chrono::{FixedOffset, TimeZone};
    use farewatch_common::db::create_schema;
    use farewatch_common::model::{Flight, SearchProfile, Strategy, TripCandidate};

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    async fn seed_profile(pool: &SqlitePool, guid: &str) -> SearchProfile {
        seed_profile_with_ceiling(pool, guid, Some(100.0)).await
    }

    async fn seed_profile_with_ceiling(
        pool: &SqlitePool,
        guid: &str,
        ceiling: Option<f64>,
    ) -> SearchProfile {
        let profile = SearchProfile {
            guid: guid.to_string(),
            name: "test".to_string(),
            origins: vec!["PSA".to_string()],
            allowed_countries: vec![],
            notify_destinations: vec![],
            price_ceiling: ceiling,
            strategy: Strategy::from_json(
                r#"{"out_days":{"fri":[17,24]},"in_days":{"sun":[15,23]},"min_nights":2,"max_nights":3}"#,
            )
            .unwrap(),
            active: true,
        };
        profiles::save_profile(pool, &profile).await.unwrap();
        profile
    }

    fn leg(origin: &str, destination: &str, day: u32, hour: u32, price: f64) -> Flight {
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

    fn make_deal(profile: &str, dest: &str, out_day: u32, in_day: u32, leg_price: f64) -> Deal {
        let trip = TripCandidate {
            outbound: leg("PSA", dest, out_day, 18, leg_price),
            return_leg: leg(dest, "PSA", in_day, 16, leg_price),
        };
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        Deal::from_candidate(profile, &trip, now)
    }

    #[tokio::test]
    async fn test_upsert_insert_then_touch_then_improve() {
        let pool = memory_pool().await;
        seed_profile(&pool, "p1").await;

        let deal = make_deal("p1", "BCN", 4, 6, 30.0);
        let outcome = upsert_if_better(&pool, &deal, 0.0).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        // Same identity, same price: only last_seen moves
        let mut same = make_deal("p1", "BCN", 4, 6, 30.0);
        same.last_seen = deal.last_seen + chrono::Duration::hours(1);
        let outcome = upsert_if_better(&pool, &same, 0.0).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        // Cheaper candidate improves in place
        let cheaper = make_deal("p1", "BCN", 4, 6, 25.0);
        let outcome = upsert_if_better(&pool, &cheaper, 0.0).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Improved { previous: 60.0 });

        let (total, count): (f64, i64) =
            sqlx::query_as("SELECT total_price, (SELECT COUNT(*) FROM deals) FROM deals")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(total, 50.0);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_pricier_candidate_never_replaces() {
        let pool = memory_pool().await;
        seed_profile(&pool, "p1").await;

        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 30.0), 0.0)
            .await
            .unwrap();
        let outcome = upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 40.0), 0.0)
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        let price: f64 = sqlx::query_scalar("SELECT total_price FROM deals")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(price, 60.0);
    }

    #[tokio::test]
    async fn test_price_drop_rearms_notification() {
        let pool = memory_pool().await;
        seed_profile(&pool, "p1").await;

        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 30.0), 0.0)
            .await
            .unwrap();
        let pending = unnotified_deals(&pool, "p1", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        mark_notified(&pool, &[pending[0].guid.clone()]).await.unwrap();
        assert!(unnotified_deals(&pool, "p1", None).await.unwrap().is_empty());

        // Any strict decrease re-arms at threshold 0
        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 29.0), 0.0)
            .await
            .unwrap();
        let rearmed = unnotified_deals(&pool, "p1", None).await.unwrap();
        assert_eq!(rearmed.len(), 1);
        assert_eq!(rearmed[0].total_price, 58.0);
        // Last notified price is kept for the next comparison
        assert_eq!(rearmed[0].notified_price, Some(60.0));
    }

    #[tokio::test]
    async fn test_small_drop_below_threshold_stays_quiet() {
        let pool = memory_pool().await;
        seed_profile(&pool, "p1").await;

        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 30.0), 5.0)
            .await
            .unwrap();
        let pending = unnotified_deals(&pool, "p1", None).await.unwrap();
        mark_notified(&pool, &[pending[0].guid.clone()]).await.unwrap();

        // 60 -> 57: drop of 3 does not clear a 5.0 threshold
        let outcome = upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 28.5), 5.0)
            .await
            .unwrap();
        assert!(matches!(outcome, UpsertOutcome::Improved { .. }));
        assert!(unnotified_deals(&pool, "p1", None).await.unwrap().is_empty());

        // 60 -> 54: drop of 6 clears it
        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 27.0), 5.0)
            .await
            .unwrap();
        assert_eq!(unnotified_deals(&pool, "p1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unnotified_respects_ceiling_and_orders_by_price() {
        let pool = memory_pool().await;
        seed_profile(&pool, "p1").await;

        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 30.0), 0.0)
            .await
            .unwrap();
        upsert_if_better(&pool, &make_deal("p1", "MAD", 4, 6, 20.0), 0.0)
            .await
            .unwrap();
        upsert_if_better(&pool, &make_deal("p1", "LIS", 4, 6, 80.0), 0.0)
            .await
            .unwrap();

        let pending = unnotified_deals(&pool, "p1", Some(100.0)).await.unwrap();
        let destinations: Vec<&str> = pending.iter().map(|d| d.destination.as_str()).collect();
        assert_eq!(destinations, vec!["MAD", "BCN"]);
    }

    #[tokio::test]
    async fn test_list_deals_active_only_and_filters() {
        let pool = memory_pool().await;
        seed_profile(&pool, "p1").await;
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();

        // Deal with both legs in the pool
        let out_live = leg("PSA", "BCN", 4, 18, 30.0);
        let ret_live = leg("BCN", "PSA", 6, 16, 30.0);
        flights::upsert_flights(&pool, &[out_live.clone(), ret_live.clone()])
            .await
            .unwrap();
        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 30.0), 0.0)
            .await
            .unwrap();

        // Deal whose legs were never pooled (or already pruned)
        upsert_if_better(&pool, &make_deal("p1", "MAD", 4, 6, 20.0), 0.0)
            .await
            .unwrap();

        let active = DealFilter {
            active_only: true,
            page: 1,
            ..DealFilter::default()
        };
        let (deals, total) = list_deals(&pool, "p1", &active, now).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].destination, "BCN");

        let all = DealFilter {
            active_only: false,
            page: 1,
            ..DealFilter::default()
        };
        let (_, total) = list_deals(&pool, "p1", &all, now).await.unwrap();
        assert_eq!(total, 2);

        let madrid_only = DealFilter {
            destination: Some("MAD".to_string()),
            active_only: false,
            page: 1,
            ..DealFilter::default()
        };
        let (deals, total) = list_deals(&pool, "p1", &madrid_only, now).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(deals[0].destination, "MAD");

        let cheap_only = DealFilter {
            max_price: Some(50.0),
            active_only: false,
            page: 1,
            ..DealFilter::default()
        };
        let (deals, _) = list_deals(&pool, "p1", &cheap_only, now).await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].destination, "MAD");

        let country_set = DealFilter {
            destinations: Some(vec!["BCN".to_string(), "GRO".to_string()]),
            active_only: false,
            page: 1,
            ..DealFilter::default()
        };
        let (deals, _) = list_deals(&pool, "p1", &country_set, now).await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].destination, "BCN");
    }

    #[tokio::test]
    async fn test_best_per_destination_across_profiles() {
        let pool = memory_pool().await;
        let p1 = seed_profile(&pool, "p1").await;
        let p2 = seed_profile_with_ceiling(&pool, "p2", Some(50.0)).await;

        upsert_if_better(&pool, &make_deal("p1", "BCN", 4, 6, 30.0), 0.0)
            .await
            .unwrap();
        upsert_if_better(&pool, &make_deal("p1", "MAD", 4, 6, 40.0), 0.0)
            .await
            .unwrap();
        // p2 undercuts BCN and has one deal above its own ceiling
        upsert_if_better(&pool, &make_deal("p2", "BCN", 4, 6, 20.0), 0.0)
            .await
            .unwrap();
        upsert_if_better(&pool, &make_deal("p2", "LIS", 4, 6, 45.0), 0.0)
            .await
            .unwrap();

        let best = best_per_destination(&pool, &[p1, p2]).await.unwrap();
        let summary: Vec<(&str, f64)> = best
            .iter()
            .map(|d| (d.destination.as_str(), d.total_price))
            .collect();
        assert_eq!(summary, vec![("BCN", 40.0), ("MAD", 80.0)]);
    }
}
