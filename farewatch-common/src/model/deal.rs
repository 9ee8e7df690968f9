//! Detected round-trip deals

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Flight;

/// Deal identity within one profile: destination plus the local
/// departure dates of both legs. Times do not participate, so a cheaper
/// flight on the same dates replaces the deal instead of creating a
/// second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DealKey {
    pub destination: String,
    pub out_date: NaiveDate,
    pub in_date: NaiveDate,
}

/// A qualifying round trip produced by the matcher, before storage.
#[derive(Debug, Clone)]
pub struct TripCandidate {
    pub outbound: Flight,
    pub return_leg: Flight,
}

impl TripCandidate {
    pub fn total_price(&self) -> f64 {
        self.outbound.price + self.return_leg.price
    }

    /// Stay length in nights: whole-day difference of the local
    /// departure dates. A Friday outbound with a Sunday return is 2
    /// nights regardless of departure hours.
    pub fn nights(&self) -> i64 {
        (self.return_leg.departure.date_naive() - self.outbound.departure.date_naive()).num_days()
    }

    pub fn key(&self) -> DealKey {
        DealKey {
            destination: self.outbound.destination.clone(),
            out_date: self.outbound.departure.date_naive(),
            in_date: self.return_leg.departure.date_naive(),
        }
    }
}

/// A stored deal. Deal rows are history: they are never deleted by the
/// pipeline, only excluded from active views once a leg leaves the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub guid: String,
    pub profile_guid: String,
    pub destination: String,
    pub destination_name: String,
    pub origin: String,
    /// Airport the return leg departs from; differs from `destination`
    /// only for metro-area matches.
    pub return_origin: String,
    pub outbound_key: String,
    pub return_key: String,
    pub outbound_departure: DateTime<FixedOffset>,
    pub return_departure: DateTime<FixedOffset>,
    pub nights: i64,
    pub total_price: f64,
    pub currency: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub notified: bool,
    /// Price at which the last notification went out; re-notification
    /// compares against this.
    pub notified_price: Option<f64>,
}

impl Deal {
    pub fn from_candidate(profile_guid: &str, trip: &TripCandidate, now: DateTime<Utc>) -> Self {
        Deal {
            guid: Uuid::new_v4().to_string(),
            profile_guid: profile_guid.to_string(),
            destination: trip.outbound.destination.clone(),
            destination_name: trip.outbound.destination_name.clone(),
            origin: trip.outbound.origin.clone(),
            return_origin: trip.return_leg.origin.clone(),
            outbound_key: trip.outbound.key(),
            return_key: trip.return_leg.key(),
            outbound_departure: trip.outbound.departure,
            return_departure: trip.return_leg.departure,
            nights: trip.nights(),
            total_price: trip.total_price(),
            currency: trip.outbound.currency.clone(),
            first_seen: now,
            last_seen: now,
            notified: false,
            notified_price: None,
        }
    }
}
