//! Upstream fare provider client.
//!
//! The pipeline talks to the provider through the `FareSource` trait so
//! tests can substitute a scripted source. The production
//! implementation queries a Ryanair-style fare-finder JSON endpoint
//! ("anywhere" one-way search per origin, plus targeted per-route
//! lookups for the return sweep) with a minimum interval between
//! requests.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use farewatch_common::config::FareApiConfig;
use farewatch_common::model::Flight;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = "farewatch/0.1.0";
const PAGE_LIMIT: u32 = 1000;

/// Fare source failures, by how the caller should react.
#[derive(Debug, Error)]
pub enum FareSourceError {
    /// Network failure, timeout or upstream 5xx; retry next cycle
    #[error("fare source unavailable: {0}")]
    Unavailable(String),

    /// Upstream asked us to back off
    #[error("fare source rate limited")]
    RateLimited,

    /// Payload did not match the expected shape
    #[error("fare payload parse error: {0}")]
    Parse(String),
}

/// One-way fare search over an inclusive local-date range. An empty
/// result is a successful scan that found nothing.
///
/// A full origin scan is two-phased: an "anywhere" sweep out of the
/// origin, then a targeted sweep from each discovered destination back
/// to it, so the pool holds both legs of every candidate round trip.
#[async_trait]
pub trait FareSource: Send + Sync {
    /// All fares departing `origin`, to any destination.
    async fn one_way_fares(
        &self,
        origin: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError>;

    /// Fares on one specific route, used for the return sweep.
    async fn one_way_fares_between(
        &self,
        origin: &str,
        destination: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError>;
}

/// Enforces a minimum interval between upstream requests.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Production fare-finder client.
pub struct FareFinderClient {
    http_client: reqwest::Client,
    base_url: String,
    currency: String,
    rate_limiter: RateLimiter,
}

impl FareFinderClient {
    pub fn new(config: &FareApiConfig) -> Result<Self, FareSourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FareSourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            currency: config.currency.clone(),
            rate_limiter: RateLimiter::new(config.min_request_interval_ms),
        })
    }

    async fn fetch(
        &self,
        origin: &str,
        destination: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/oneWayFares", self.base_url);
        tracing::debug!(origin = %origin, from = %from, to = %to, "querying fare finder");

        let mut params: Vec<(&str, String)> = vec![
            ("departureAirportIataCode", origin.to_string()),
            ("outboundDepartureDateFrom", from.to_string()),
            ("outboundDepartureDateTo", to.to_string()),
            ("currency", self.currency.clone()),
            ("limit", PAGE_LIMIT.to_string()),
            ("market", "en".to_string()),
            ("language", "en".to_string()),
        ];
        if let Some(destination) = destination {
            params.push(("arrivalAirportIataCode", destination.to_string()));
        }

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FareSourceError::Unavailable("request timed out".to_string())
                } else {
                    FareSourceError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();

        // The endpoint answers 404 for routes with no fares at all
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(FareSourceError::RateLimited);
        }

        if !status.is_success() {
            return Err(FareSourceError::Unavailable(format!(
                "upstream returned {status}"
            )));
        }

        let payload: FaresResponse = response
            .json()
            .await
            .map_err(|e| FareSourceError::Parse(e.to_string()))?;

        let observed_at = Utc::now();
        let flights = payload
            .fares
            .iter()
            .map(|fare| to_flight(&fare.outbound, &self.currency, observed_at))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(origin = %origin, fares = flights.len(), "fare finder response parsed");
        Ok(flights)
    }
}

#[async_trait]
impl FareSource for FareFinderClient {
    async fn one_way_fares(
        &self,
        origin: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError> {
        self.fetch(origin, None, from, to).await
    }

    async fn one_way_fares_between(
        &self,
        origin: &str,
        destination: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Flight>, FareSourceError> {
        self.fetch(origin, Some(destination), from, to).await
    }
}

#[derive(Debug, Deserialize)]
struct FaresResponse {
    #[serde(default)]
    fares: Vec<FareEntry>,
}

#[derive(Debug, Deserialize)]
struct FareEntry {
    outbound: OutboundFare,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutboundFare {
    departure_airport: AirportRef,
    arrival_airport: AirportRef,
    /// Local wall-clock time, no offset, e.g. `2025-07-04T18:30:00`
    departure_date: String,
    arrival_date: String,
    price: FarePrice,
    #[serde(default)]
    flight_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirportRef {
    iata_code: String,
    name: String,
    #[serde(default)]
    country_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FarePrice {
    value: f64,
    #[serde(default)]
    currency_code: Option<String>,
}

impl AirportRef {
    /// Display name joined with the country, matching how the booking
    /// sites label airports ("Barcelona, Spain").
    fn full_name(&self) -> String {
        match &self.country_name {
            Some(country) => format!("{}, {}", self.name, country),
            None => self.name.clone(),
        }
    }
}

/// Provider timestamps are local wall-clock with no zone; they are
/// carried at offset +00:00 so the local hour and date survive
/// round-trips through the database.
fn parse_departure(raw: &str) -> Result<chrono::DateTime<chrono::FixedOffset>, FareSourceError> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map_err(|e| FareSourceError::Parse(format!("bad timestamp {raw:?}: {e}")))?;
    Ok(naive.and_utc().fixed_offset())
}

fn to_flight(
    fare: &OutboundFare,
    fallback_currency: &str,
    observed_at: chrono::DateTime<Utc>,
) -> Result<Flight, FareSourceError> {
    Ok(Flight {
        origin: fare.departure_airport.iata_code.clone(),
        origin_name: fare.departure_airport.full_name(),
        destination: fare.arrival_airport.iata_code.clone(),
        destination_name: fare.arrival_airport.full_name(),
        departure: parse_departure(&fare.departure_date)?,
        arrival: parse_departure(&fare.arrival_date)?,
        flight_number: fare.flight_number.clone(),
        price: fare.price.value,
        currency: fare
            .price
            .currency_code
            .clone()
            .unwrap_or_else(|| fallback_currency.to_string()),
        observed_at,
    })
}
