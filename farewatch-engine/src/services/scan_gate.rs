//! Per-origin scan admission.
//!
//! Profiles sharing an origin must not trigger duplicate upstream
//! fetches. `ScanGate::begin` resolves atomically to one of three
//! outcomes: scan now (holding the origin lock), cooldown still
//! active, or another task is scanning this origin right now. The
//! cooldown read happens under the held lock, so two concurrent runs
//! can never both decide to scan.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use farewatch_common::Result;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::scan_log::{self, ScanOutcome};

#[derive(Default)]
pub struct ScanGate {
    origins: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Holds the origin lock between the decision to scan and the
/// `record` call. Dropping it without recording releases the origin
/// with no cooldown written, so the next cycle may retry.
pub struct ScanPermit {
    origin: String,
    _guard: OwnedMutexGuard<()>,
}

pub enum ScanDecision {
    /// Cooldown expired and the origin lock is held; scan, then record
    Go(ScanPermit),
    /// Another scan finished recently
    Cooling { until: DateTime<Utc> },
    /// Another task holds the origin lock right now
    Busy,
}

impl ScanGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(
        &self,
        pool: &SqlitePool,
        origin: &str,
        now: DateTime<Utc>,
    ) -> Result<ScanDecision> {
        let lock = {
            let mut origins = self.origins.lock().await;
            origins
                .entry(origin.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let Ok(guard) = lock.try_lock_owned() else {
            return Ok(ScanDecision::Busy);
        };

        match scan_log::next_due(pool, origin).await? {
            Some(due) if due > now => Ok(ScanDecision::Cooling { until: due }),
            _ => Ok(ScanDecision::Go(ScanPermit {
                origin: origin.to_string(),
                _guard: guard,
            })),
        }
    }
}

impl ScanPermit {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Record the scan while the origin lock is still held. A
    /// rate-limited attempt backs off twice as long as a normal
    /// cooldown.
    pub async fn record(
        self,
        pool: &SqlitePool,
        now: DateTime<Utc>,
        outcome: ScanOutcome,
        cooldown: chrono::Duration,
    ) -> Result<()> {
        let next_due_at = match outcome {
            ScanOutcome::Ok => now + cooldown,
            ScanOutcome::RateLimited => now + cooldown * 2,
        };
        scan_log::record_scan(pool, &self.origin, now, next_due_at, outcome).await
    }
}
