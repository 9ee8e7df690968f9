//! Pipeline status endpoint
//!
//! Reports the latest recorded run per profile plus the size of the
//! flight pool, so a dashboard can tell at a glance whether scans are
//! succeeding without scraping logs.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db::runs::{self, ProfileRun};
use crate::db::flights;
use crate::error::ApiResult;
use crate::AppState;

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Flights currently in the shared pool (live or not)
    pub flights_pooled: i64,
    /// Latest run per profile, ordered by profile guid
    pub runs: Vec<ProfileRun>,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let flights_pooled = flights::count_flights(&state.pipeline.db).await?;
    let runs = runs::latest_runs(&state.pipeline.db).await?;

    Ok(Json(StatusResponse {
        flights_pooled,
        runs,
    }))
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new().route("/api/status", get(get_status))
}
