//! Pipeline orchestration.
//!
//! `Pipeline::run_profile` is the end-to-end unit of work for one
//! profile: scan each origin through the cooldown gate, snapshot the
//! pool, match, store, notify, prune, and persist a run record. The
//! scheduler and the manual refresh endpoint both call it; all of its
//! write paths are idempotent, so overlapping calls are safe.

use std::sync::Arc;

use farewatch_common::config::EngineConfig;
use farewatch_common::model::{Deal, SearchProfile};
use farewatch_common::{time, Result};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::db::deals::{self, UpsertOutcome};
use crate::db::runs::{self, ProfileRun};
use crate::db::scan_log::ScanOutcome;
use crate::db::{flights, scan_log};
use crate::services::fare_source::{FareSource, FareSourceError};
use crate::services::matcher::{self, MatchOptions};
use crate::services::notifier::{self, PushChannel};
use crate::services::scan_gate::{ScanDecision, ScanGate};

/// Everything a profile run needs, shared between the scheduler and
/// the HTTP surface.
pub struct Pipeline {
    pub db: SqlitePool,
    pub config: Arc<EngineConfig>,
    pub source: Arc<dyn FareSource>,
    pub push: Arc<dyn PushChannel>,
    gate: ScanGate,
}

impl Pipeline {
    pub fn new(
        db: SqlitePool,
        config: Arc<EngineConfig>,
        source: Arc<dyn FareSource>,
        push: Arc<dyn PushChannel>,
    ) -> Self {
        Self {
            db,
            config,
            source,
            push,
            gate: ScanGate::new(),
        }
    }

    /// Run the full pipeline for one profile and persist the outcome.
    /// A failure inside the run is itself recorded as a failed run;
    /// the returned record reports either way.
    pub async fn run_profile(&self, profile: &SearchProfile) -> Result<ProfileRun> {
        let started_at = time::now();
        info!(profile = %profile.name, "profile run started");

        let run = match self.execute(profile, started_at).await {
            Ok(run) => run,
            Err(e) => {
                error!(profile = %profile.name, error = %e, "profile run failed");
                ProfileRun {
                    profile_guid: profile.guid.clone(),
                    started_at,
                    finished_at: time::now(),
                    success: false,
                    fares_upserted: 0,
                    deals_matched: 0,
                    deals_new: 0,
                    notifications_sent: 0,
                    detail: serde_json::json!({ "error": e.to_string() }),
                }
            }
        };

        runs::record_run(&self.db, &run).await?;
        if run.success {
            info!(
                profile = %profile.name,
                fares = run.fares_upserted,
                matched = run.deals_matched,
                new = run.deals_new,
                notified = run.notifications_sent,
                "profile run finished"
            );
        }
        Ok(run)
    }

    async fn execute(
        &self,
        profile: &SearchProfile,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<ProfileRun> {
        let mut origin_outcomes = serde_json::Map::new();

        // Scan each origin, isolated: one origin failing does not stop
        // the others, and matching proceeds with whatever the pool holds
        let mut fares_upserted: i64 = 0;
        for origin in &profile.origins {
            let outcome = self.scan_origin(origin).await?;
            if let ScanReport::Fetched(count) = outcome {
                fares_upserted += count;
            }
            origin_outcomes.insert(origin.clone(), outcome.label().into());
        }

        // Single-statement snapshot, immune to a concurrent prune
        let now = time::now();
        let snapshot = flights::live_flights_for_origins(
            &self.db,
            &profile.origins,
            now,
            self.config.flight_staleness(),
        )
        .await?;

        let options = MatchOptions {
            hour_tolerance: self.config.hour_tolerance,
            nearby_radius_km: self.config.nearby_radius_km,
        };
        let trips = matcher::match_profile(profile, &snapshot, &options);
        debug!(
            profile = %profile.name,
            snapshot = snapshot.len(),
            candidates = trips.len(),
            "matching complete"
        );

        let mut deals_new: i64 = 0;
        for trip in &trips {
            let deal = Deal::from_candidate(&profile.guid, trip, time::now());
            match deals::upsert_if_better(&self.db, &deal, self.config.renotify_drop).await? {
                UpsertOutcome::Inserted => {
                    info!(
                        destination = %deal.destination,
                        price = deal.total_price,
                        "new deal"
                    );
                    deals_new += 1;
                }
                UpsertOutcome::Improved { previous } => {
                    info!(
                        destination = %deal.destination,
                        price = deal.total_price,
                        previous,
                        "deal improved"
                    );
                }
                UpsertOutcome::Unchanged => {}
            }
        }

        let notifications_sent =
            notifier::notify_new_deals(&self.db, self.push.as_ref(), profile).await? as i64;

        self.prune().await?;

        Ok(ProfileRun {
            profile_guid: profile.guid.clone(),
            started_at,
            finished_at: time::now(),
            success: true,
            fares_upserted,
            deals_matched: trips.len() as i64,
            deals_new,
            notifications_sent,
            detail: serde_json::json!({ "origins": origin_outcomes }),
        })
    }

    async fn scan_origin(&self, origin: &str) -> Result<ScanReport> {
        let now = time::now();
        let permit = match self.gate.begin(&self.db, origin, now).await? {
            ScanDecision::Go(permit) => permit,
            ScanDecision::Cooling { until } => {
                debug!(origin = %origin, until = %until, "scan skipped, cooling down");
                return Ok(ScanReport::Cooling);
            }
            ScanDecision::Busy => {
                debug!(origin = %origin, "scan skipped, another task is scanning");
                return Ok(ScanReport::Busy);
            }
        };

        let today = now.date_naive();
        let horizon = today + chrono::Duration::days(self.config.lookup_horizon_days as i64);

        let outbound = match self.source.one_way_fares(origin, today, horizon).await {
            Ok(fares) => fares,
            Err(FareSourceError::RateLimited) => {
                warn!(origin = %origin, "fare source rate limited, backing off");
                permit
                    .record(
                        &self.db,
                        time::now(),
                        ScanOutcome::RateLimited,
                        self.config.scan_cooldown(),
                    )
                    .await?;
                return Ok(ScanReport::RateLimited);
            }
            Err(e) => {
                // Nothing recorded: the next cycle may retry
                error!(origin = %origin, error = %e, "origin scan failed");
                drop(permit);
                return Ok(ScanReport::Failed(e.to_string()));
            }
        };
        let mut written = flights::upsert_flights(&self.db, &outbound).await? as i64;

        // Return sweep: one targeted fetch per discovered destination,
        // filling in the legs that come back. A failing destination is
        // skipped so the rest of the sweep still lands.
        let mut destinations: Vec<&str> =
            outbound.iter().map(|f| f.destination.as_str()).collect();
        destinations.sort_unstable();
        destinations.dedup();
        for destination in destinations {
            match self
                .source
                .one_way_fares_between(destination, origin, today, horizon)
                .await
            {
                Ok(returns) => {
                    written += flights::upsert_flights(&self.db, &returns).await? as i64;
                }
                Err(FareSourceError::RateLimited) => {
                    warn!(origin = %origin, "fare source rate limited mid-sweep, backing off");
                    permit
                        .record(
                            &self.db,
                            time::now(),
                            ScanOutcome::RateLimited,
                            self.config.scan_cooldown(),
                        )
                        .await?;
                    return Ok(ScanReport::RateLimited);
                }
                Err(e) => {
                    warn!(
                        origin = %origin,
                        destination = %destination,
                        error = %e,
                        "return sweep failed for destination"
                    );
                }
            }
        }

        permit
            .record(&self.db, time::now(), ScanOutcome::Ok, self.config.scan_cooldown())
            .await?;
        info!(origin = %origin, fares = written, "origin scanned");
        Ok(ScanReport::Fetched(written))
    }

    async fn prune(&self) -> Result<()> {
        let now = time::now();
        let stale_flights = flights::prune_flights(&self.db, now, self.config.flight_staleness()).await?;
        let old_scans =
            scan_log::prune_scan_log(&self.db, now - self.config.scan_log_retention()).await?;
        let old_runs = runs::prune_runs(&self.db, now - self.config.scan_log_retention()).await?;
        if stale_flights > 0 || old_scans > 0 || old_runs > 0 {
            info!(
                flights = stale_flights,
                scans = old_scans,
                runs = old_runs,
                "pruned stale data"
            );
        }
        Ok(())
    }
}

/// Per-origin scan outcome for the run record.
enum ScanReport {
    Fetched(i64),
    Cooling,
    Busy,
    RateLimited,
    Failed(String),
}

impl ScanReport {
    fn label(&self) -> String {
        match self {
            ScanReport::Fetched(count) => format!("ok ({count} fares)"),
            ScanReport::Cooling => "cooldown".to_string(),
            ScanReport::Busy => "busy".to_string(),
            ScanReport::RateLimited => "rate_limited".to_string(),
            ScanReport::Failed(cause) => format!("failed: {cause}"),
        }
    }
}
