//! Deal listing endpoint

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use farewatch_common::model::Deal;
use serde::{Deserialize, Serialize};

use crate::db::deals::{self, DealFilter, PAGE_SIZE};
use crate::db::profiles;
use crate::error::{ApiError, ApiResult};
use crate::services::airports;
use crate::AppState;

/// Query parameters for the deal listing
#[derive(Debug, Deserialize)]
pub struct DealsQuery {
    /// Exact destination airport (IATA)
    pub destination: Option<String>,
    /// Destination country (ISO alpha-2), resolved to its airports
    pub country: Option<String>,
    /// Maximum total price
    pub max_price: Option<f64>,
    /// Hide deals whose legs left the pool or already departed
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_active_only() -> bool {
    true
}

fn default_page() -> i64 {
    1
}

/// Deal listing response
#[derive(Debug, Serialize)]
pub struct DealListResponse {
    pub profile_guid: String,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub deals: Vec<Deal>,
}

/// GET /api/profiles/:guid/deals
pub async fn list_profile_deals(
    State(state): State<AppState>,
    Path(guid): Path<String>,
    Query(query): Query<DealsQuery>,
) -> ApiResult<Json<DealListResponse>> {
    let profile = profiles::get_profile(&state.pipeline.db, &guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {}", guid)))?;

    // A country with no known airports yields an empty IN list, which
    // the query layer short-circuits to zero results.
    let destinations = query
        .country
        .as_deref()
        .map(|country| airports::iatas_for_country(country));

    let filter = DealFilter {
        destination: query
            .destination
            .as_deref()
            .map(|d| d.trim().to_ascii_uppercase()),
        destinations,
        max_price: query.max_price,
        active_only: query.active_only,
        page: query.page,
    };

    let now = farewatch_common::time::now();
    let (deals, total) = deals::list_deals(&state.pipeline.db, &profile.guid, &filter, now).await?;
    let total_pages = (total + PAGE_SIZE - 1) / PAGE_SIZE;

    Ok(Json(DealListResponse {
        profile_guid: profile.guid,
        total,
        page: filter.page.max(1),
        page_size: PAGE_SIZE,
        total_pages,
        deals,
    }))
}

/// Build deal listing routes
pub fn deal_routes() -> Router<AppState> {
    Router::new().route("/api/profiles/:guid/deals", get(list_profile_deals))
}
