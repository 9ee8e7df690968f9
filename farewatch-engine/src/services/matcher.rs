//! Round-trip matching.
//!
//! Pure function from a profile plus a flight snapshot to candidate
//! trips. No I/O happens here; the orchestrator takes the snapshot and
//! stores the results. For each home airport the snapshot is split
//! into qualifying outbound and return legs, legs are paired by
//! destination (exactly, or within the metro radius when configured),
//! and the cheapest pairing per (destination, out date, in date)
//! survives.

use std::cmp::Ordering;
use std::collections::HashMap;

use farewatch_common::model::{DealKey, Flight, SearchProfile, TripCandidate};

use crate::services::airports;

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    /// Hours to widen every strategy window on both sides
    pub hour_tolerance: u32,
    /// Metro-area pairing radius; 0 disables it
    pub nearby_radius_km: f64,
}

pub fn match_profile(
    profile: &SearchProfile,
    snapshot: &[Flight],
    options: &MatchOptions,
) -> Vec<TripCandidate> {
    let mut best: HashMap<DealKey, TripCandidate> = HashMap::new();

    for origin in &profile.origins {
        let outbound: Vec<&Flight> = snapshot
            .iter()
            .filter(|f| &f.origin == origin)
            .filter(|f| profile.allows_country(airports::country_of(&f.destination)))
            .filter(|f| profile.strategy.admits_outbound(f.departure, options.hour_tolerance))
            .collect();

        let returns: Vec<&Flight> = snapshot
            .iter()
            .filter(|f| &f.destination == origin)
            .filter(|f| profile.strategy.admits_return(f.departure, options.hour_tolerance))
            .collect();

        for out in &outbound {
            for ret in &returns {
                let same_airport = ret.origin == out.destination;
                let metro_pair = !same_airport
                    && options.nearby_radius_km > 0.0
                    && airports::are_nearby(&out.destination, &ret.origin, options.nearby_radius_km);
                if !same_airport && !metro_pair {
                    continue;
                }
                if ret.departure <= out.departure {
                    continue;
                }

                let trip = TripCandidate {
                    outbound: (*out).clone(),
                    return_leg: (*ret).clone(),
                };
                if !profile.strategy.nights_within(trip.nights()) {
                    continue;
                }
                if !profile.within_ceiling(trip.total_price()) {
                    continue;
                }

                // Keyed by the outbound destination, also for metro
                // pairs returning from a sibling airport
                match best.entry(trip.key()) {
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(trip);
                    }
                    std::collections::hash_map::Entry::Occupied(mut entry) => {
                        if rank(&trip, entry.get()) == Ordering::Less {
                            entry.insert(trip);
                        }
                    }
                }
            }
        }
    }

    let mut trips: Vec<TripCandidate> = best.into_values().collect();
    trips.sort_by_key(|t| t.key());
    trips
}

/// Preference order between two trips for the same deal key: cheaper
/// first, then the earlier-observed legs, then the flight keys. Total
/// order, so dedup is deterministic.
fn rank(a: &TripCandidate, b: &TripCandidate) -> Ordering {
    a.total_price()
        .total_cmp(&b.total_price())
        .then_with(|| a.outbound.observed_at.cmp(&b.outbound.observed_at))
        .then_with(|| a.return_leg.observed_at.cmp(&b.return_leg.observed_at))
        .then_with(|| a.outbound.key().cmp(&b.outbound.key()))
        .then_with(|| a.return_leg.key().cmp(&b.return_leg.key()))
}
