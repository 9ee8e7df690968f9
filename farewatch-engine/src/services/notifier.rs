//! Push notification dispatch.
//!
//! Decides what to push and hands delivery to a `PushChannel`, so
//! tests capture messages without a network. Immediate deal alerts are
//! opt-in per destination (the profile's bell set); the daily digest
//! summarizes the best deal per destination across all profiles.
//! Delivery failures never fail a pipeline run.

use async_trait::async_trait;
use farewatch_common::config::NtfyConfig;
use farewatch_common::model::{Deal, SearchProfile};
use farewatch_common::{time, Error, Result};
use sqlx::SqlitePool;
use thiserror::Error as ThisError;
use tracing::{debug, error, info, warn};

use crate::db::deals;

const DEAL_TAG: &str = "airplane";
const DIGEST_TAG: &str = "globe_with_meridians";
const DIGEST_MAX_LINES: usize = 15;

#[derive(Debug, ThisError)]
pub enum NotifyError {
    #[error("push delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub click_url: Option<String>,
    pub tags: String,
    pub priority: u8,
}

/// Delivery transport for push messages.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn push(&self, message: &PushMessage) -> std::result::Result<(), NotifyError>;

    /// Whether the channel can deliver at all. Dispatch still marks
    /// deals as handled when this is false, it just sends nothing.
    fn is_configured(&self) -> bool {
        true
    }
}

/// ntfy-style channel: HTTP POST to `{server}/{topic}` with the
/// message text as body and metadata in headers.
pub struct NtfyChannel {
    http_client: reqwest::Client,
    server: String,
    topic: Option<String>,
}

impl NtfyChannel {
    pub fn new(config: &NtfyConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("building push client: {e}")))?;

        Ok(Self {
            http_client,
            server: config.server.trim_end_matches('/').to_string(),
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl PushChannel for NtfyChannel {
    async fn push(&self, message: &PushMessage) -> std::result::Result<(), NotifyError> {
        let Some(topic) = &self.topic else {
            warn!("push topic not configured, dropping message");
            return Ok(());
        };

        let url = format!("{}/{}", self.server, topic);
        let mut request = self
            .http_client
            .post(&url)
            .header("Title", &message.title)
            .header("Tags", &message.tags)
            .header("Priority", message.priority.to_string())
            .body(message.body.clone());
        if let Some(click) = &message.click_url {
            request = request.header("Click", click);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "push server returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.topic.is_some()
    }
}

/// Deep link into a round-trip booking search for the deal's dates.
fn booking_url(deal: &Deal) -> String {
    format!(
        "https://www.ryanair.com/it/it/trip/flights/select\
         ?adults=1&teens=0&children=0&infants=0\
         &dateOut={}&dateIn={}\
         &originIata={}&destinationIata={}\
         &isReturn=true",
        deal.outbound_departure.date_naive(),
        deal.return_departure.date_naive(),
        deal.origin,
        deal.destination,
    )
}

/// Airport names arrive as "Barcelona, Spain"; alerts show the city.
fn short_name(deal: &Deal) -> &str {
    let name = deal.destination_name.split(',').next().unwrap_or("").trim();
    if name.is_empty() {
        &deal.destination
    } else {
        name
    }
}

fn deal_message(deal: &Deal) -> PushMessage {
    PushMessage {
        title: format!("{} {:.0}EUR pp", short_name(deal), deal.total_price),
        body: format!(
            "{} -> {} {} / {}",
            deal.origin,
            deal.destination,
            time::short_date(deal.outbound_departure),
            time::short_date(deal.return_departure),
        ),
        click_url: Some(booking_url(deal)),
        tags: DEAL_TAG.to_string(),
        priority: 3,
    }
}

fn digest_message(best: &[Deal]) -> PushMessage {
    let lines: Vec<String> = best
        .iter()
        .take(DIGEST_MAX_LINES)
        .map(|deal| {
            format!(
                "{}: {:.0}EUR ({}-{})",
                short_name(deal),
                deal.total_price,
                time::compact_date(deal.outbound_departure),
                time::compact_date(deal.return_departure),
            )
        })
        .collect();

    PushMessage {
        title: format!("Daily Flight Digest ({} destinations)", best.len()),
        body: lines.join("\n"),
        click_url: None,
        tags: DIGEST_TAG.to_string(),
        priority: 3,
    }
}

/// Push the cheapest unnotified deal per belled destination, then mark
/// every loaded deal notified — also the suppressed ones, so they are
/// not reconsidered each cycle. A later price drop re-arms them
/// through the deal store. Returns the number of pushes delivered.
pub async fn notify_new_deals(
    pool: &SqlitePool,
    push: &dyn PushChannel,
    profile: &SearchProfile,
) -> Result<u64> {
    let pending = deals::unnotified_deals(pool, &profile.guid, profile.price_ceiling).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut sent = 0u64;
    if push.is_configured() {
        // Cheapest per destination: the list is price-ordered, first wins
        let mut seen = std::collections::HashSet::new();
        for deal in &pending {
            if !seen.insert(deal.destination.clone()) {
                continue;
            }
            if !profile.notify_destinations.contains(&deal.destination) {
                continue;
            }
            let message = deal_message(deal);
            match push.push(&message).await {
                Ok(()) => {
                    info!(
                        profile = %profile.name,
                        destination = %deal.destination,
                        price = deal.total_price,
                        "deal notification sent"
                    );
                    sent += 1;
                }
                Err(e) => {
                    error!(destination = %deal.destination, error = %e, "deal notification failed");
                }
            }
        }
    } else {
        warn!(profile = %profile.name, "push channel not configured, suppressing deal alerts");
    }

    let guids: Vec<String> = pending.iter().map(|d| d.guid.clone()).collect();
    deals::mark_notified(pool, &guids).await?;
    Ok(sent)
}

/// One summary push across all given profiles: cheapest in-ceiling
/// deal per destination, at most 15 lines. Returns the number of
/// destinations summarized, zero when unconfigured or empty.
pub async fn send_daily_digest(
    pool: &SqlitePool,
    push: &dyn PushChannel,
    profiles: &[SearchProfile],
) -> Result<u64> {
    if !push.is_configured() {
        debug!("push channel not configured, skipping digest");
        return Ok(0);
    }

    let best = deals::best_per_destination(pool, profiles).await?;
    if best.is_empty() {
        return Ok(0);
    }

    let message = digest_message(&best);
    match push.push(&message).await {
        Ok(()) => info!(destinations = best.len(), "daily digest sent"),
        Err(e) => error!(error = %e, "daily digest failed"),
    }
    Ok(best.len() as u64)
}
