//! One-way fare observations

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::time;

/// A single observed one-way fare.
///
/// Flights are profile-independent: every profile matches against the
/// same shared pool. Departure and arrival are airport-local times with
/// their UTC offset preserved; strategy matching reads the local
/// wall-clock hour and weekday directly from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub origin: String,
    pub origin_name: String,
    pub destination: String,
    pub destination_name: String,
    /// Airport-local departure time
    pub departure: DateTime<FixedOffset>,
    /// Airport-local arrival time
    pub arrival: DateTime<FixedOffset>,
    pub flight_number: String,
    /// Per-person fare
    pub price: f64,
    pub currency: String,
    /// When this fare was last observed upstream
    pub observed_at: DateTime<Utc>,
}

impl Flight {
    /// Identity key. Re-observing the same (origin, destination,
    /// departure, flight number) yields the same key, so writes upsert
    /// instead of duplicating.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.origin,
            self.destination,
            time::local_to_db(self.departure),
            self.flight_number
        )
    }
}
