//! Search profiles and trip strategies
//!
//! A strategy describes the shape of an acceptable trip: which weekdays
//! and departure-hour windows qualify for the outbound and return legs,
//! and how many nights the stay may last. Weekday keys are normalized
//! into the `Weekday` enum when a strategy is deserialized; the matcher
//! never sees raw day names or indices.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Day of week, Monday first.
///
/// Serialized as lowercase three-letter names. Parsing additionally
/// accepts full English names (any case) and the indices 0-6 with
/// Monday = 0, matching the strategy payloads produced by older
/// dashboard versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(index) = s.trim().parse::<i64>() {
            return match index {
                0 => Ok(Weekday::Mon),
                1 => Ok(Weekday::Tue),
                2 => Ok(Weekday::Wed),
                3 => Ok(Weekday::Thu),
                4 => Ok(Weekday::Fri),
                5 => Ok(Weekday::Sat),
                6 => Ok(Weekday::Sun),
                _ => Err(format!("weekday index {} out of range 0-6 (Monday = 0)", index)),
            };
        }
        match s.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" => Ok(Weekday::Mon),
            "tue" | "tuesday" => Ok(Weekday::Tue),
            "wed" | "wednesday" => Ok(Weekday::Wed),
            "thu" | "thursday" => Ok(Weekday::Thu),
            "fri" | "friday" => Ok(Weekday::Fri),
            "sat" | "saturday" => Ok(Weekday::Sat),
            "sun" | "sunday" => Ok(Weekday::Sun),
            other => Err(format!(
                "unknown weekday '{}' (expected a day name or 0-6, Monday = 0)",
                other
            )),
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

/// Allowed departure hours, start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u8, u8)", into = "(u8, u8)")]
pub struct HourWindow {
    pub start: u8,
    pub end: u8,
}

impl HourWindow {
    /// Whether a local departure hour falls inside the window widened by
    /// `tolerance` hours on both sides: `start - tol <= hour < end + tol`.
    pub fn admits(&self, hour: u32, tolerance: u32) -> bool {
        let hour = hour as i64;
        let tolerance = tolerance as i64;
        hour >= self.start as i64 - tolerance && hour < self.end as i64 + tolerance
    }
}

impl TryFrom<(u8, u8)> for HourWindow {
    type Error = String;

    fn try_from((start, end): (u8, u8)) -> std::result::Result<Self, Self::Error> {
        if start >= end {
            return Err(format!("hour window start {} must be before end {}", start, end));
        }
        if end > 24 {
            return Err(format!("hour window end {} exceeds 24", end));
        }
        Ok(HourWindow { start, end })
    }
}

impl From<HourWindow> for (u8, u8) {
    fn from(w: HourWindow) -> Self {
        (w.start, w.end)
    }
}

/// Weekday to departure-hour window map for one trip direction.
///
/// An empty map is legal and matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayWindows(pub BTreeMap<Weekday, HourWindow>);

impl DayWindows {
    pub fn window_for(&self, day: Weekday) -> Option<HourWindow> {
        self.0.get(&day).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for DayWindows {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, HourWindow>::deserialize(deserializer)?;
        let mut days = BTreeMap::new();
        for (key, window) in raw {
            let day = key.parse::<Weekday>().map_err(serde::de::Error::custom)?;
            if days.insert(day, window).is_some() {
                return Err(serde::de::Error::custom(format!(
                    "duplicate weekday '{}' after normalization",
                    key
                )));
            }
        }
        Ok(DayWindows(days))
    }
}

impl FromIterator<(Weekday, HourWindow)> for DayWindows {
    fn from_iter<I: IntoIterator<Item = (Weekday, HourWindow)>>(iter: I) -> Self {
        DayWindows(iter.into_iter().collect())
    }
}

/// Declarative trip shape for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Strategy {
    /// Outbound leg: weekday -> allowed departure hours
    pub out_days: DayWindows,
    /// Return leg: weekday -> allowed departure hours
    pub in_days: DayWindows,
    /// Inclusive stay-length bounds in nights
    pub min_nights: u32,
    pub max_nights: u32,
}

impl Strategy {
    /// Parse and validate a strategy from its JSON storage form. This is
    /// the ingestion gate: anything malformed is rejected here so the
    /// matcher only ever sees well-formed strategies.
    pub fn from_json(raw: &str) -> Result<Self> {
        let strategy: Strategy = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidInput(format!("malformed strategy: {}", e)))?;
        if strategy.min_nights > strategy.max_nights {
            return Err(Error::InvalidInput(format!(
                "min_nights {} exceeds max_nights {}",
                strategy.min_nights, strategy.max_nights
            )));
        }
        Ok(strategy)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Internal(format!("strategy serialization failed: {}", e)))
    }

    /// Whether a departure qualifies as an outbound leg
    pub fn admits_outbound(&self, departure: DateTime<FixedOffset>, tolerance: u32) -> bool {
        self.out_days
            .window_for(Weekday::from(departure.weekday()))
            .is_some_and(|w| w.admits(departure.hour(), tolerance))
    }

    /// Whether a departure qualifies as a return leg
    pub fn admits_return(&self, departure: DateTime<FixedOffset>, tolerance: u32) -> bool {
        self.in_days
            .window_for(Weekday::from(departure.weekday()))
            .is_some_and(|w| w.admits(departure.hour(), tolerance))
    }

    pub fn nights_within(&self, nights: i64) -> bool {
        nights >= self.min_nights as i64 && nights <= self.max_nights as i64
    }
}

/// User search configuration. The pipeline only reads profiles; the
/// dashboard that owns them writes through its own surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProfile {
    pub guid: String,
    pub name: String,
    /// Home airports scanned for this profile
    pub origins: Vec<String>,
    /// ISO country codes allowed as destinations; empty = unrestricted
    pub allowed_countries: Vec<String>,
    /// Destinations opted in for immediate push (the bell set)
    pub notify_destinations: Vec<String>,
    /// Total round-trip price ceiling per person
    pub price_ceiling: Option<f64>,
    pub strategy: Strategy,
    pub active: bool,
}

impl SearchProfile {
    /// Destination-country filter. Fails closed: when a filter is set,
    /// an unknown country never passes.
    pub fn allows_country(&self, country: Option<&str>) -> bool {
        if self.allowed_countries.is_empty() {
            return true;
        }
        match country {
            Some(c) => self
                .allowed_countries
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(c)),
            None => false,
        }
    }

    pub fn within_ceiling(&self, total_price: f64) -> bool {
        match self.price_ceiling {
            Some(ceiling) => total_price <= ceiling,
            None => true,
        }
    }
}
