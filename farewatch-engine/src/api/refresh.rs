//! Manual refresh endpoint
//!
//! Runs the full pipeline for one profile on demand. The run goes
//! through the same scan gate and idempotent write paths as the
//! scheduler, so triggering it while a scheduled run is in flight is
//! safe; the origin-level cooldown simply reports the overlap.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};

use crate::db::profiles;
use crate::db::runs::ProfileRun;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/profiles/:guid/refresh
pub async fn refresh_profile(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> ApiResult<Json<ProfileRun>> {
    let profile = profiles::get_profile(&state.pipeline.db, &guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {}", guid)))?;

    let run = state.pipeline.run_profile(&profile).await?;
    Ok(Json(run))
}

/// Build refresh routes
pub fn refresh_routes() -> Router<AppState> {
    Router::new().route("/api/profiles/:guid/refresh", post(refresh_profile))
}
