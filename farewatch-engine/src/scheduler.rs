//! Polling scheduler.
//!
//! A long-lived task that ticks every `poll_interval_seconds`, runs
//! the pipeline for every profile that is due (never run, or last run
//! older than the update interval), and fires the daily digest at the
//! first tick past the configured hour. The first tick happens
//! immediately, so a restart catches up without waiting a full poll.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use farewatch_common::model::SearchProfile;
use farewatch_common::{time, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::db::runs::ProfileRun;
use crate::db::{profiles, runs};
use crate::services::notifier;
use crate::services::orchestrator::Pipeline;

pub async fn run_scheduler(pipeline: Arc<Pipeline>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(pipeline.config.poll_interval());

    // A restart after the digest hour must not re-send today's digest
    let mut last_digest_sent = {
        let now = chrono::Local::now();
        if now.hour() >= pipeline.config.digest_hour {
            Some(now.date_naive())
        } else {
            None
        }
    };

    info!(
        poll_seconds = pipeline.config.poll_interval().as_secs(),
        "scheduler started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_due_profiles(&pipeline).await {
                    error!(error = %e, "scheduler tick failed");
                }
                maybe_send_digest(&pipeline, &mut last_digest_sent).await;
            }
            _ = shutdown.changed() => {
                info!("scheduler stopping");
                return;
            }
        }
    }
}

async fn run_due_profiles(pipeline: &Arc<Pipeline>) -> Result<()> {
    let active = profiles::list_active_profiles(&pipeline.db).await?;
    let latest = runs::latest_runs(&pipeline.db).await?;
    let threshold = time::now() - pipeline.config.update_interval();
    let due = select_due(active, &latest, threshold);

    if due.is_empty() {
        return Ok(());
    }
    info!(count = due.len(), "running due profiles");

    stream::iter(due)
        .map(|profile| {
            let pipeline = pipeline.clone();
            async move {
                // Failures are recorded per profile; never stop the loop
                if let Err(e) = pipeline.run_profile(&profile).await {
                    error!(profile = %profile.name, error = %e, "scheduled run failed");
                }
            }
        })
        .buffer_unordered(pipeline.config.max_workers)
        .collect::<Vec<_>>()
        .await;

    Ok(())
}

/// Profiles with no recorded run, or whose latest run started before
/// the threshold.
fn select_due(
    profiles: Vec<SearchProfile>,
    latest: &[ProfileRun],
    threshold: DateTime<Utc>,
) -> Vec<SearchProfile> {
    let last_started: HashMap<&str, DateTime<Utc>> = latest
        .iter()
        .map(|run| (run.profile_guid.as_str(), run.started_at))
        .collect();

    profiles
        .into_iter()
        .filter(|profile| match last_started.get(profile.guid.as_str()) {
            None => true,
            Some(started) => *started < threshold,
        })
        .collect()
}

fn digest_is_due(now_hour: u32, today: NaiveDate, digest_hour: u32, last_sent: Option<NaiveDate>) -> bool {
    now_hour >= digest_hour && last_sent != Some(today)
}

async fn maybe_send_digest(pipeline: &Arc<Pipeline>, last_sent: &mut Option<NaiveDate>) {
    let now = chrono::Local::now();
    if !digest_is_due(now.hour(), now.date_naive(), pipeline.config.digest_hour, *last_sent) {
        return;
    }
    // Claim the slot first; a failed attempt waits for tomorrow
    *last_sent = Some(now.date_naive());

    let profiles = match profiles::list_active_profiles(&pipeline.db).await {
        Ok(profiles) => profiles,
        Err(e) => {
            error!(error = %e, "digest profile load failed");
            return;
        }
    };
    if profiles.is_empty() {
        debug!("no active profiles, skipping digest");
        return;
    }

    match notifier::send_daily_digest(&pipeline.db, pipeline.push.as_ref(), &profiles).await {
        Ok(count) => debug!(destinations = count, "daily digest pass complete"),
        Err(e) => error!(error = %e, "daily digest failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use farewatch_common::model::Strategy;

    fn profile(guid: &str) -> SearchProfile {
        SearchProfile {
            guid: guid.to_string(),
            name: guid.to_string(),
            origins: vec!["PSA".to_string()],
            allowed_countries: vec![],
            notify_destinations: vec![],
            price_ceiling: None,
            strategy: Strategy::from_json(
                r#"{"out_days":{"fri":[17,24]},"in_days":{"sun":[15,23]},"min_nights":2,"max_nights":3}"#,
            )
            .unwrap(),
            active: true,
        }
    }

    fn run(guid: &str, hour: u32) -> ProfileRun {
        let started = Utc.with_ymd_and_hms(2025, 7, 1, hour, 0, 0).unwrap();
        ProfileRun {
            profile_guid: guid.to_string(),
            started_at: started,
            finished_at: started,
            success: true,
            fares_upserted: 0,
            deals_matched: 0,
            deals_new: 0,
            notifications_sent: 0,
            detail: serde_json::json!({}),
        }
    }

    #[test]
    fn test_select_due_never_run_and_stale() {
        let profiles = vec![profile("never"), profile("stale"), profile("fresh")];
        let latest = vec![run("stale", 8), run("fresh", 11)];
        // Threshold at 10:00: the 08:00 run is stale, the 11:00 one is not
        let threshold = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();

        let due = select_due(profiles, &latest, threshold);
        let guids: Vec<&str> = due.iter().map(|p| p.guid.as_str()).collect();
        assert_eq!(guids, vec!["never", "stale"]);
    }

    #[test]
    fn test_digest_window() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        // Before the hour: never due
        assert!(!digest_is_due(7, today, 8, None));
        // At or past the hour: due until sent today
        assert!(digest_is_due(8, today, 8, None));
        assert!(digest_is_due(14, today, 8, Some(yesterday)));
        assert!(!digest_is_due(14, today, 8, Some(today)));
    }
}
