//! Shared fixtures: pools, flights, profiles, and pipeline doubles.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use farewatch_common::config::EngineConfig;
use farewatch_common::db::create_schema;
use farewatch_common::model::{Flight, SearchProfile, Strategy};
use farewatch_engine::services::fare_source::{FareSource, FareSourceError};
use farewatch_engine::services::notifier::{NotifyError, PushChannel, PushMessage};
use farewatch_engine::services::orchestrator::Pipeline;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

/// In-memory database with the full schema. One connection, so the
/// schema survives for the whole test.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();
    pool
}

/// Engine config tuned for tests. Cooldown is the knob most tests
/// care about: 0 lets consecutive runs re-fetch, a large value makes
/// the second run hit the cooldown path.
pub fn test_config(scan_cooldown_minutes: u64) -> EngineConfig {
    EngineConfig {
        scan_cooldown_minutes,
        ..EngineConfig::default()
    }
}

/// Assemble a pipeline over a fresh in-memory database.
pub async fn test_pipeline(
    config: EngineConfig,
    source: Arc<ScriptedFareSource>,
    push: Arc<RecordingPush>,
) -> Pipeline {
    let pool = memory_pool().await;
    Pipeline::new(pool, Arc::new(config), source, push)
}

/// First occurrence of `weekday` at least a week out, at `hour` local
/// time (+02:00). Keeps fixture departures in the future and on a
/// known weekday no matter when the tests run.
pub fn upcoming(weekday: Weekday, hour: u32) -> DateTime<FixedOffset> {
    let tz = FixedOffset::east_opt(2 * 3600).unwrap();
    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() != weekday {
        date += Duration::days(1);
    }
    tz.from_local_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
        .unwrap()
}

/// A Friday 18:00 outbound with its Sunday 16:00 return, two nights
/// apart.
pub fn weekend_pair() -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    let friday = upcoming(Weekday::Fri, 18);
    let tz = *friday.offset();
    let sunday_date = friday.date_naive() + Duration::days(2);
    let sunday = tz
        .from_local_datetime(&sunday_date.and_hms_opt(16, 0, 0).unwrap())
        .unwrap();
    (friday, sunday)
}

pub fn flight(
    origin: &str,
    origin_name: &str,
    destination: &str,
    destination_name: &str,
    departure: DateTime<FixedOffset>,
    flight_number: &str,
    price: f64,
) -> Flight {
    Flight {
        origin: origin.to_string(),
        origin_name: origin_name.to_string(),
        destination: destination.to_string(),
        destination_name: destination_name.to_string(),
        departure,
        arrival: departure + Duration::hours(2),
        flight_number: flight_number.to_string(),
        price,
        currency: "EUR".to_string(),
        observed_at: Utc::now(),
    }
}

/// Friday-out/Sunday-back weekend profile. Tests adjust fields after.
pub fn weekend_profile(origins: &[&str]) -> SearchProfile {
    SearchProfile {
        guid: Uuid::new_v4().to_string(),
        name: "weekend hops".to_string(),
        origins: origins.iter().map(|o| o.to_string()).collect(),
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

/// Scripted upstream response for one scan.
pub enum ScriptedResponse {
    Fares(Vec<Flight>),
    RateLimited,
    Unavailable(String),
}

/// Fare source double: answers each origin from a queue of scripted
/// responses and records every call. An exhausted queue answers with
/// an empty (successful) scan.
#[derive(Default)]
pub struct ScriptedFareSource {
    responses: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFareSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next anywhere sweep out of `origin`.
    pub fn script(&self, origin: &str, response: ScriptedResponse) {
        self.push(origin.to_string(), response);
    }

    /// Script the next targeted sweep for `origin -> destination`.
    pub fn script_between(&self, origin: &str, destination: &str, response: ScriptedResponse) {
        self.push(route_key(origin, destination), response);
    }

    fn push(&self, key: String, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(response);
    }

    /// How many anywhere sweeps hit this origin.
    pub fn call_count(&self, origin: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.as_str() == origin)
            .count()
    }

    fn answer(&self, key: &str) -> Result<Vec<Flight>, FareSourceError> {
        self.calls.lock().unwrap().push(key.to_string());
        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(ScriptedResponse::Fares(fares)) => Ok(fares),
            Some(ScriptedResponse::RateLimited) => Err(FareSourceError::RateLimited),
            Some(ScriptedResponse::Unavailable(msg)) => Err(FareSourceError::Unavailable(msg)),
            None => Ok(Vec::new()),
        }
    }
}

fn route_key(origin: &str, destination: &str) -> String {
    format!("{origin}->{destination}")
}

#[async_trait]
impl FareSource for ScriptedFareSource {
    async fn one_way_fares(
        &self,
        origin: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError> {
        self.answer(origin)
    }

    async fn one_way_fares_between(
        &self,
        origin: &str,
        destination: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError> {
        self.answer(&route_key(origin, destination))
    }
}

/// Push channel double that records every message.
pub struct RecordingPush {
    messages: Mutex<Vec<PushMessage>>,
    configured: bool,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            configured: true,
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            configured: false,
        }
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.messages.lock().unwrap().clone()
    }
}

impl Default for RecordingPush {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushChannel for RecordingPush {
    async fn push(&self, message: &PushMessage) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}
